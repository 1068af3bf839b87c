//! Photos and prompts read from local directories.
//!
//! Lets a folder of scans be restored with a folder of prompt files, without
//! the record store. Every prompt runs against the photo itself rather than
//! against the previous prompt's output.

use std::path::{Path, PathBuf};

use heirloom_core::prompt::{GenerationParams, WorkflowType};
use heirloom_core::text::slugify;

use crate::chain::{ChainRequest, ChainStep};
use crate::error::PipelineError;

/// File extensions accepted as photos, compared case-insensitively.
pub const PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff", "webp"];

/// Prompt files have no extension, `.txt` or `.md`.
const PROMPT_EXTENSIONS: &[&str] = &["", "txt", "md"];

/// Use case given to folder prompts; it is one of the image-only ones.
const FOLDER_USE_CASE: &str = "Restoration";

/// A photo file. Its stem names its output directory.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalPhoto {
    pub stem: String,
    pub path: PathBuf,
}

impl LocalPhoto {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn url(&self) -> String {
        format!("file://{}", self.path.display())
    }
}

/// A prompt file and its text.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalPrompt {
    pub file_name: String,
    pub slug: String,
    pub text: String,
}

impl LocalPrompt {
    pub fn to_step(&self, model: Option<&str>) -> ChainStep {
        ChainStep {
            prompt_id: String::new(),
            name: self.file_name.clone(),
            slug: self.slug.clone(),
            template: self.text.clone(),
            use_case: FOLDER_USE_CASE.to_string(),
            workflow_type: WorkflowType::Standalone,
            execution_priority: 0,
            params: GenerationParams {
                model: model.map(str::to_string),
                ..GenerationParams::default()
            },
        }
    }
}

/// Non-empty prompt files of `dir`, sorted by file name.
pub async fn read_prompts(dir: &Path) -> Result<Vec<LocalPrompt>, PipelineError> {
    let mut prompts = Vec::new();
    for path in sorted_files(dir, "Prompts").await? {
        if !has_extension(&path, PROMPT_EXTENSIONS) {
            continue;
        }
        let text = tokio::fs::read_to_string(&path).await?;
        let text = text.trim();
        if text.is_empty() {
            tracing::warn!(path = %path.display(), "Skipping empty prompt file");
            continue;
        }
        prompts.push(LocalPrompt {
            file_name: file_name(&path),
            slug: slugify(&file_stem(&path)),
            text: text.to_string(),
        });
    }

    if prompts.is_empty() {
        return Err(PipelineError::Validation(format!(
            "no usable prompt files in {}",
            dir.display()
        )));
    }
    Ok(prompts)
}

/// Photo files of `dir`, sorted by file name, optionally narrowed to the
/// one whose stem is `only`.
pub async fn find_photos(dir: &Path, only: Option<&str>) -> Result<Vec<LocalPhoto>, PipelineError> {
    let mut photos: Vec<LocalPhoto> = sorted_files(dir, "Photos")
        .await?
        .into_iter()
        .filter(|path| has_extension(path, PHOTO_EXTENSIONS))
        .map(|path| LocalPhoto {
            stem: file_stem(&path),
            path,
        })
        .collect();

    if photos.is_empty() {
        return Err(PipelineError::Validation(format!(
            "no photos found in {}",
            dir.display()
        )));
    }
    if let Some(stem) = only {
        photos.retain(|photo| photo.stem == stem);
        if photos.is_empty() {
            return Err(PipelineError::NotFound {
                entity: "Photo",
                id: stem.to_string(),
            });
        }
    }
    Ok(photos)
}

/// Every prompt against `photo`, each reading the photo itself.
pub fn folder_request(photo: &LocalPhoto, prompts: &[LocalPrompt], model: Option<&str>) -> ChainRequest {
    let steps = prompts.iter().map(|p| p.to_step(model)).collect();
    ChainRequest::new(&photo.stem, photo.file_name(), photo.url(), steps)
        .with_mode(WorkflowType::Standalone)
        .from_original()
}

async fn sorted_files(dir: &Path, what: &str) -> Result<Vec<PathBuf>, PipelineError> {
    // Absolute paths keep the `file://` URLs usable from any working directory.
    let dir = tokio::fs::canonicalize(dir).await.map_err(|e| {
        PipelineError::Validation(format!("{what} directory {} unreadable: {e}", dir.display()))
    })?;
    let mut entries = tokio::fs::read_dir(&dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

fn has_extension(path: &Path, accepted: &[&str]) -> bool {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    accepted.contains(&extension.as_str())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use heirloom_core::prompt::requires_image_only;

    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) {
        std::fs::write(dir.join(name), contents).unwrap();
    }

    #[tokio::test]
    async fn prompt_files_are_sorted_and_slugged() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "02 Colorize.md", "Add natural colour.");
        write(dir.path(), "01_clean.txt", "  Remove scratches.\n");
        write(dir.path(), "03 blank.txt", "   \n");
        write(dir.path(), "notes.json", "{}");
        write(dir.path(), "README", "Sharpen faces.");

        let prompts = read_prompts(dir.path()).await.unwrap();
        let slugs: Vec<&str> = prompts.iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(slugs, ["01-clean", "02-colorize", "readme"]);
        assert_eq!(prompts[0].text, "Remove scratches.");
    }

    #[tokio::test]
    async fn only_empty_prompts_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.txt", "");
        assert_matches!(read_prompts(dir.path()).await, Err(PipelineError::Validation(_)));
    }

    #[tokio::test]
    async fn missing_directory_is_a_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        assert_matches!(
            find_photos(&dir.path().join("nope"), None).await,
            Err(PipelineError::Validation(msg)) if msg.starts_with("Photos directory")
        );
    }

    #[tokio::test]
    async fn photos_filter_by_extension_and_stem() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.TIF", "x");
        write(dir.path(), "a.jpg", "x");
        write(dir.path(), "c.gif", "x");
        std::fs::create_dir(dir.path().join("d.png")).unwrap();

        let photos = find_photos(dir.path(), None).await.unwrap();
        let stems: Vec<&str> = photos.iter().map(|p| p.stem.as_str()).collect();
        assert_eq!(stems, ["a", "b"]);
        assert!(photos[0].path.is_absolute());
        assert!(photos[0].url().starts_with("file:///"));

        let only = find_photos(dir.path(), Some("b")).await.unwrap();
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].file_name(), "b.TIF");

        assert_matches!(
            find_photos(dir.path(), Some("z")).await,
            Err(PipelineError::NotFound { id, .. }) if id == "z"
        );
    }

    #[tokio::test]
    async fn folder_without_photos_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "notes.txt", "x");
        assert_matches!(find_photos(dir.path(), None).await, Err(PipelineError::Validation(_)));
    }

    #[test]
    fn folder_request_runs_every_prompt_on_the_photo() {
        let photo = LocalPhoto {
            stem: "scan".into(),
            path: PathBuf::from("/photos/scan.jpg"),
        };
        let prompts = vec![LocalPrompt {
            file_name: "clean.txt".into(),
            slug: "clean".into(),
            text: "Remove dust.".into(),
        }];

        let request = folder_request(&photo, &prompts, Some("gemini-test"));
        assert!(request.from_original);
        assert_eq!(request.photo_id, "scan");
        assert_eq!(request.input_url, "file:///photos/scan.jpg");
        assert_eq!(request.steps[0].params.model.as_deref(), Some("gemini-test"));
        assert!(requires_image_only(&request.steps[0].use_case));
    }
}
