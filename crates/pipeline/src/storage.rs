//! Generated asset persistence.
//!
//! ```text
//! <output_dir>/jobs/<job_id>/restored_<job_id>.<ext>
//! <output_dir>/batches/<batch_id>/<job_id>/restored_<job_id>.<ext>
//! <output_dir>/<photo_id>/<photo_id>__<step:02>_<prompt_slug>_<n>.<ext>
//! <output_dir>/<photo_id>/meta.json
//! <output_dir>/<photo_id>/original.<ext>
//! <output_dir>/results_<photo_id>.json
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use heirloom_db::Job;
use heirloom_gemini::GeneratedImage;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

pub const SIDECAR_FILE: &str = "meta.json";

/// Sidecar key and file-name stem of a chain step. The position comes first
/// so two steps sharing a slug never write to the same file.
pub fn step_key(step: usize, prompt_slug: &str) -> String {
    format!("{step:02}_{prompt_slug}")
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Where generated assets go and how they are addressed.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub output_dir: PathBuf,
    /// Prefix for result URLs. Without it, results are addressed as
    /// `file://` URLs.
    pub public_base_url: Option<String>,
}

impl StorageConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            public_base_url: None,
        }
    }

    /// | Env Var           | Default                 |
    /// |-------------------|-------------------------|
    /// | `OUTPUT_DIR`      | `generated/restorations`|
    /// | `PUBLIC_BASE_URL` | unset                   |
    pub fn from_env() -> Self {
        let output_dir =
            std::env::var("OUTPUT_DIR").unwrap_or_else(|_| "generated/restorations".into());
        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .ok()
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty());
        Self {
            output_dir: output_dir.into(),
            public_base_url,
        }
    }
}

// ---------------------------------------------------------------------------
// Sidecar
// ---------------------------------------------------------------------------

/// Files produced by one prompt for one photo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SidecarEntry {
    pub prompt: String,
    #[serde(default)]
    pub files: Vec<String>,
}

/// Contents of `<photo_id>/meta.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sidecar {
    /// Keyed by [`step_key`].
    #[serde(default)]
    pub prompts: BTreeMap<String, SidecarEntry>,
    /// Summary of the most recent chain run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<serde_json::Value>,
}

impl Sidecar {
    /// Fold `entries` into this sidecar. Files already listed for a key are
    /// kept, new ones appended.
    pub fn merge(&mut self, entries: BTreeMap<String, SidecarEntry>) {
        for (key, entry) in entries {
            let existing = self.prompts.entry(key).or_default();
            existing.prompt = entry.prompt;
            for file in entry.files {
                if !existing.files.contains(&file) {
                    existing.files.push(file);
                }
            }
        }
    }
}

/// A file written by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredAsset {
    pub path: PathBuf,
    pub url: String,
}

// ---------------------------------------------------------------------------
// ResultStore
// ---------------------------------------------------------------------------

/// Destination for generated images and their metadata.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Persist the restored image of a job; returns where it can be found.
    async fn save_job_result(
        &self,
        job: &Job,
        image: &GeneratedImage,
    ) -> Result<StoredAsset, PipelineError>;

    /// Persist output `index` (1-based) of chain step `step` (1-based).
    async fn save_chain_output(
        &self,
        photo_id: &str,
        step: usize,
        prompt_slug: &str,
        index: usize,
        image: &GeneratedImage,
    ) -> Result<StoredAsset, PipelineError>;

    /// Merge `entries` into the photo's sidecar and record `last_run`.
    async fn write_sidecar(
        &self,
        photo_id: &str,
        entries: BTreeMap<String, SidecarEntry>,
        last_run: serde_json::Value,
    ) -> Result<PathBuf, PipelineError>;

    /// Write a standalone run summary for a photo.
    async fn save_run_summary(
        &self,
        photo_id: &str,
        summary: &serde_json::Value,
    ) -> Result<PathBuf, PipelineError>;
}

/// [`ResultStore`] on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalResultStore {
    config: StorageConfig,
}

impl LocalResultStore {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    pub fn output_dir(&self) -> &Path {
        &self.config.output_dir
    }

    /// Directory holding a job's restored image.
    pub fn job_dir(&self, job: &Job) -> Result<PathBuf, PipelineError> {
        let job_id = safe_segment(&job.job_id)?;
        Ok(match &job.batch_id {
            Some(batch_id) => self
                .config
                .output_dir
                .join("batches")
                .join(safe_segment(batch_id)?)
                .join(job_id),
            None => self.config.output_dir.join("jobs").join(job_id),
        })
    }

    pub fn photo_dir(&self, photo_id: &str) -> Result<PathBuf, PipelineError> {
        Ok(self.config.output_dir.join(safe_segment(photo_id)?))
    }

    /// Copy a local source photo next to its outputs as `original.<ext>`.
    /// An existing copy is left untouched.
    pub async fn copy_original(&self, photo_id: &str, source: &Path) -> Result<PathBuf, PipelineError> {
        let extension = source
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let dir = self.photo_dir(photo_id)?;
        let path = if extension.is_empty() {
            dir.join("original")
        } else {
            dir.join(format!("original.{extension}"))
        };
        if tokio::fs::try_exists(&path).await? {
            return Ok(path);
        }
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::copy(source, &path).await?;
        tracing::debug!(photo_id, path = %path.display(), "Copied original photo");
        Ok(path)
    }

    /// Public or `file://` URL for a path under the output directory.
    pub fn url_for(&self, path: &Path) -> Result<String, PipelineError> {
        if let Some(base) = &self.config.public_base_url {
            let relative = path.strip_prefix(&self.config.output_dir).unwrap_or(path);
            let segments: Vec<String> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            return Ok(format!("{base}/{}", segments.join("/")));
        }

        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };
        Ok(format!("file://{}", absolute.display()))
    }

    async fn write(&self, path: PathBuf, bytes: &[u8]) -> Result<StoredAsset, PipelineError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        let url = self.url_for(&path)?;
        tracing::debug!(path = %path.display(), bytes = bytes.len(), "Wrote asset");
        Ok(StoredAsset { path, url })
    }
}

#[async_trait]
impl ResultStore for LocalResultStore {
    async fn save_job_result(
        &self,
        job: &Job,
        image: &GeneratedImage,
    ) -> Result<StoredAsset, PipelineError> {
        let name = format!("restored_{}.{}", job.job_id, image.extension());
        let path = self.job_dir(job)?.join(name);
        self.write(path, &image.bytes).await
    }

    async fn save_chain_output(
        &self,
        photo_id: &str,
        step: usize,
        prompt_slug: &str,
        index: usize,
        image: &GeneratedImage,
    ) -> Result<StoredAsset, PipelineError> {
        let name = format!(
            "{photo_id}__{}_{index}.{}",
            step_key(step, safe_segment(prompt_slug)?),
            image.extension()
        );
        let path = self.photo_dir(photo_id)?.join(name);
        self.write(path, &image.bytes).await
    }

    async fn write_sidecar(
        &self,
        photo_id: &str,
        entries: BTreeMap<String, SidecarEntry>,
        last_run: serde_json::Value,
    ) -> Result<PathBuf, PipelineError> {
        let dir = self.photo_dir(photo_id)?;
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(SIDECAR_FILE);

        let mut sidecar = match tokio::fs::read(&path).await {
            Ok(raw) => serde_json::from_slice::<Sidecar>(&raw).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Unreadable sidecar replaced");
                Sidecar::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Sidecar::default(),
            Err(e) => return Err(e.into()),
        };
        sidecar.merge(entries);
        sidecar.last_run = Some(last_run);

        let bytes = serde_json::to_vec_pretty(&sidecar)
            .map_err(|e| PipelineError::Storage(std::io::Error::other(e)))?;
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }

    async fn save_run_summary(
        &self,
        photo_id: &str,
        summary: &serde_json::Value,
    ) -> Result<PathBuf, PipelineError> {
        let name = format!("results_{}.json", safe_segment(photo_id)?);
        let path = self.config.output_dir.join(name);
        tokio::fs::create_dir_all(&self.config.output_dir).await?;
        let bytes = serde_json::to_vec_pretty(summary)
            .map_err(|e| PipelineError::Storage(std::io::Error::other(e)))?;
        tokio::fs::write(&path, bytes).await?;
        Ok(path)
    }
}

/// Reject identifiers that would escape their directory.
fn safe_segment(segment: &str) -> Result<&str, PipelineError> {
    let invalid = segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains(['/', '\\', '\0']);
    if invalid {
        return Err(PipelineError::Validation(format!(
            "'{segment}' cannot be used as a path segment"
        )));
    }
    Ok(segment)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use heirloom_db::NewJob;

    use super::*;

    fn png(bytes: &[u8]) -> GeneratedImage {
        GeneratedImage {
            bytes: bytes.to_vec(),
            mime_type: "image/png".into(),
        }
    }

    fn store(dir: &Path) -> LocalResultStore {
        LocalResultStore::new(StorageConfig::new(dir))
    }

    #[tokio::test]
    async fn original_is_copied_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir.path().join("out"));
        let source = dir.path().join("Grandma 1952.JPG");
        std::fs::write(&source, b"first").unwrap();

        let copied = store.copy_original("Grandma 1952", &source).await.unwrap();
        assert_eq!(copied, dir.path().join("out").join("Grandma 1952").join("original.jpg"));

        std::fs::write(&source, b"second").unwrap();
        store.copy_original("Grandma 1952", &source).await.unwrap();
        assert_eq!(std::fs::read(&copied).unwrap(), b"first");
    }

    #[tokio::test]
    async fn single_and_batch_jobs_use_separate_trees() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let single = Job::new(NewJob::new("https://x/a.jpg", "standard"));
        let asset = store.save_job_result(&single, &png(b"one")).await.unwrap();
        assert_eq!(
            asset.path,
            dir.path()
                .join("jobs")
                .join(&single.job_id)
                .join(format!("restored_{}.png", single.job_id))
        );
        assert!(asset.url.starts_with("file://"));

        let batched = Job::new(NewJob::new("https://x/b.jpg", "standard").in_batch("b-1"));
        let asset = store.save_job_result(&batched, &png(b"two")).await.unwrap();
        assert!(asset
            .path
            .starts_with(dir.path().join("batches").join("b-1").join(&batched.job_id)));
        assert_eq!(std::fs::read(&asset.path).unwrap(), b"two");
    }

    #[tokio::test]
    async fn public_base_url_is_used_for_urls() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = StorageConfig::new(dir.path());
        config.public_base_url = Some("https://cdn.example.com/out".into());
        let store = LocalResultStore::new(config);

        let jpeg = GeneratedImage {
            bytes: vec![1],
            mime_type: "image/jpeg".into(),
        };
        let asset = store
            .save_chain_output("rec1", 3, "color-restoration", 2, &jpeg)
            .await
            .unwrap();
        assert_eq!(
            asset.url,
            "https://cdn.example.com/out/rec1/rec1__03_color-restoration_2.jpg"
        );
    }

    #[tokio::test]
    async fn sidecar_is_merged_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());

        let first = BTreeMap::from([(
            "restore".to_string(),
            SidecarEntry {
                prompt: "Restore".into(),
                files: vec!["a.png".into()],
            },
        )]);
        store
            .write_sidecar("rec1", first, serde_json::json!({ "run": 1 }))
            .await
            .unwrap();

        let second = BTreeMap::from([
            (
                "restore".to_string(),
                SidecarEntry {
                    prompt: "Restore".into(),
                    files: vec!["a.png".into(), "b.png".into()],
                },
            ),
            (
                "colorize".to_string(),
                SidecarEntry {
                    prompt: "Colorize".into(),
                    files: vec!["c.png".into()],
                },
            ),
        ]);
        let path = store
            .write_sidecar("rec1", second, serde_json::json!({ "run": 2 }))
            .await
            .unwrap();

        let sidecar: Sidecar = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(sidecar.prompts["restore"].files, vec!["a.png", "b.png"]);
        assert_eq!(sidecar.prompts["colorize"].files, vec!["c.png"]);
        assert_eq!(sidecar.last_run, Some(serde_json::json!({ "run": 2 })));
    }

    #[tokio::test]
    async fn path_traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        assert_matches!(
            store.save_chain_output("../etc", 1, "x", 1, &png(b"")).await,
            Err(PipelineError::Validation(_))
        );
        assert_matches!(
            store.save_chain_output("rec1", 1, "a/b", 1, &png(b"")).await,
            Err(PipelineError::Validation(_))
        );
        assert_matches!(store.photo_dir(""), Err(PipelineError::Validation(_)));
    }

    #[tokio::test]
    async fn run_summary_lands_in_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let path = store
            .save_run_summary("rec9", &serde_json::json!({ "ok": true }))
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("results_rec9.json"));
    }
}
