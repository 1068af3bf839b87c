/// Table names used by the restoration toolchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub restorations: String,
    pub photos: String,
    pub prompts: String,
    pub workflows: String,
    pub test_runs: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            restorations: "Restorations".into(),
            photos: "PhotoGallery".into(),
            prompts: "Prompts".into(),
            workflows: "Workflows".into(),
            test_runs: "Test Runs".into(),
        }
    }
}

/// Airtable connection settings loaded from environment variables.
#[derive(Clone)]
pub struct AirtableConfig {
    pub api_key: String,
    pub base_id: String,
    /// Base REST URL without the base id (default: `https://api.airtable.com/v0`).
    pub api_url: String,
    /// Floor on request spacing (default: `5`).
    pub requests_per_second: f64,
    pub tables: TableNames,
}

pub const DEFAULT_API_URL: &str = "https://api.airtable.com/v0";
pub const DEFAULT_REQUESTS_PER_SECOND: f64 = 5.0;

impl AirtableConfig {
    pub fn new(api_key: impl Into<String>, base_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_id: base_id.into(),
            api_url: DEFAULT_API_URL.into(),
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
            tables: TableNames::default(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// | Env Var                        | Default                       |
    /// |--------------------------------|-------------------------------|
    /// | `AIRTABLE_API_KEY`             | required                      |
    /// | `AIRTABLE_BASE_ID`             | required                      |
    /// | `AIRTABLE_API_URL`             | `https://api.airtable.com/v0` |
    /// | `AIRTABLE_REQUESTS_PER_SECOND` | `5`                           |
    /// | `AIRTABLE_RESTORATIONS_TABLE`  | `Restorations`                |
    /// | `AIRTABLE_PHOTOS_TABLE`        | `PhotoGallery`                |
    /// | `AIRTABLE_PROMPTS_TABLE`       | `Prompts`                     |
    /// | `AIRTABLE_WORKFLOWS_TABLE`     | `Workflows`                   |
    /// | `AIRTABLE_TEST_RUNS_TABLE`     | `Test Runs`                   |
    pub fn from_env() -> Self {
        let api_key = std::env::var("AIRTABLE_API_KEY").expect("AIRTABLE_API_KEY must be set");
        let base_id = std::env::var("AIRTABLE_BASE_ID").expect("AIRTABLE_BASE_ID must be set");

        let api_url = std::env::var("AIRTABLE_API_URL")
            .unwrap_or_else(|_| DEFAULT_API_URL.into())
            .trim_end_matches('/')
            .to_string();

        let requests_per_second: f64 = std::env::var("AIRTABLE_REQUESTS_PER_SECOND")
            .unwrap_or_else(|_| DEFAULT_REQUESTS_PER_SECOND.to_string())
            .parse()
            .expect("AIRTABLE_REQUESTS_PER_SECOND must be a number");

        let defaults = TableNames::default();
        let table = |var: &str, default: String| std::env::var(var).unwrap_or(default);
        let tables = TableNames {
            restorations: table("AIRTABLE_RESTORATIONS_TABLE", defaults.restorations),
            photos: table("AIRTABLE_PHOTOS_TABLE", defaults.photos),
            prompts: table("AIRTABLE_PROMPTS_TABLE", defaults.prompts),
            workflows: table("AIRTABLE_WORKFLOWS_TABLE", defaults.workflows),
            test_runs: table("AIRTABLE_TEST_RUNS_TABLE", defaults.test_runs),
        };

        Self {
            api_key,
            base_id,
            api_url,
            requests_per_second,
            tables,
        }
    }
}

impl std::fmt::Debug for AirtableConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AirtableConfig")
            .field("api_key", &"<redacted>")
            .field("base_id", &self.base_id)
            .field("api_url", &self.api_url)
            .field("requests_per_second", &self.requests_per_second)
            .field("tables", &self.tables)
            .finish()
    }
}
