//! Command-line parsing for the worker binary.

use std::path::PathBuf;

use heirloom_core::prompt::WorkflowType;

pub fn usage() -> &'static str {
    "heirloom-worker: run prompt chains against PhotoGallery records or local folders

USAGE:
  heirloom-worker workflow [--dry-run] <photo-id>...
  heirloom-worker prompts [--mode standalone|sequential] [--use-case NAME]
                          [--photo-limit N] [--prompt-limit N] [--dry-run]
  heirloom-worker restore-dir --photos-dir DIR --prompts-dir DIR [--out-dir DIR]
                              [--only-photo STEM] [--model NAME] [--dry-run]

COMMANDS:
  workflow     Run each photo's linked workflow (or its selected prompts)
  prompts      Run active prompts over the first N photos with images
  restore-dir  Run every prompt file against every photo of a folder

OPTIONS:
  --mode          Prompt workflow type to select and chain policy (default: standalone)
  --use-case      Only prompts with this use case
  --photo-limit   Photos to process (default: 1)
  --prompt-limit  Prompts per photo (default: all)
  --photos-dir    Folder of .jpg/.jpeg/.png/.tif/.tiff/.webp photos
  --prompts-dir   Folder of prompt files (no extension, .txt or .md)
  --out-dir       Output root (default: OUTPUT_DIR)
  --only-photo    Only the photo with this file stem
  --model         Model for every prompt (default: GEMINI_MODEL)
  --dry-run       List what would run without calling the model
  -h, --help      Show this help
"
}

/// Options of the `prompts` command.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptsOptions {
    pub mode: WorkflowType,
    pub use_case: Option<String>,
    pub photo_limit: usize,
    pub prompt_limit: Option<usize>,
    pub dry_run: bool,
}

impl Default for PromptsOptions {
    fn default() -> Self {
        Self {
            mode: WorkflowType::Standalone,
            use_case: None,
            photo_limit: 1,
            prompt_limit: None,
            dry_run: false,
        }
    }
}

/// Options of the `restore-dir` command.
#[derive(Debug, Clone, PartialEq)]
pub struct RestoreDirOptions {
    pub photos_dir: PathBuf,
    pub prompts_dir: PathBuf,
    pub out_dir: Option<PathBuf>,
    pub only_photo: Option<String>,
    pub model: Option<String>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Workflow { photo_ids: Vec<String>, dry_run: bool },
    Prompts(PromptsOptions),
    RestoreDir(RestoreDirOptions),
    Help,
}

impl Command {
    /// Whether the command reads the record store.
    pub fn needs_records(&self) -> bool {
        matches!(self, Command::Workflow { .. } | Command::Prompts(_))
    }
}

/// Parse arguments (without the program name).
pub fn parse_args(args: &[String]) -> Result<Command, String> {
    if args.iter().any(|a| a == "-h" || a == "--help") {
        return Ok(Command::Help);
    }
    let Some((command, rest)) = args.split_first() else {
        return Err("missing command".into());
    };

    match command.as_str() {
        "workflow" => parse_workflow(rest),
        "prompts" => parse_prompts(rest).map(Command::Prompts),
        "restore-dir" => parse_restore_dir(rest).map(Command::RestoreDir),
        other => Err(format!("unknown command: {other}")),
    }
}

fn parse_workflow(args: &[String]) -> Result<Command, String> {
    let mut photo_ids = Vec::new();
    let mut dry_run = false;
    for arg in args {
        match arg.as_str() {
            "--dry-run" => dry_run = true,
            flag if flag.starts_with("--") => return Err(format!("unknown option: {flag}")),
            id => photo_ids.push(id.to_string()),
        }
    }
    if photo_ids.is_empty() {
        return Err("workflow requires at least one photo id".into());
    }
    Ok(Command::Workflow { photo_ids, dry_run })
}

fn parse_prompts(args: &[String]) -> Result<PromptsOptions, String> {
    let mut options = PromptsOptions::default();
    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--mode" => {
                i += 1;
                let v = args.get(i).ok_or("--mode requires standalone|sequential")?;
                options.mode = match v.to_ascii_lowercase().as_str() {
                    "standalone" => WorkflowType::Standalone,
                    "sequential" => WorkflowType::Sequential,
                    other => return Err(format!("invalid --mode: {other}")),
                };
            }
            "--use-case" => {
                i += 1;
                let v = args.get(i).ok_or("--use-case requires NAME")?;
                options.use_case = Some(v.to_string());
            }
            "--photo-limit" => {
                i += 1;
                let v = args.get(i).ok_or("--photo-limit requires N")?;
                options.photo_limit = parse_count("--photo-limit", v)?;
            }
            "--prompt-limit" => {
                i += 1;
                let v = args.get(i).ok_or("--prompt-limit requires N")?;
                options.prompt_limit = Some(parse_count("--prompt-limit", v)?);
            }
            "--dry-run" => options.dry_run = true,
            other => return Err(format!("unknown option: {other}")),
        }
        i += 1;
    }
    Ok(options)
}

fn parse_restore_dir(args: &[String]) -> Result<RestoreDirOptions, String> {
    let mut photos_dir = None;
    let mut prompts_dir = None;
    let mut out_dir = None;
    let mut only_photo = None;
    let mut model = None;
    let mut dry_run = false;

    let mut i = 0usize;
    while i < args.len() {
        let flag = args[i].as_str();
        if flag == "--dry-run" {
            dry_run = true;
            i += 1;
            continue;
        }
        i += 1;
        let value = || args.get(i).cloned().ok_or(format!("{flag} requires a value"));
        match flag {
            "--photos-dir" => photos_dir = Some(PathBuf::from(value()?)),
            "--prompts-dir" => prompts_dir = Some(PathBuf::from(value()?)),
            "--out-dir" => out_dir = Some(PathBuf::from(value()?)),
            "--only-photo" => only_photo = Some(value()?),
            "--model" => model = Some(value()?),
            other => return Err(format!("unknown option: {other}")),
        }
        i += 1;
    }

    Ok(RestoreDirOptions {
        photos_dir: photos_dir.ok_or("restore-dir requires --photos-dir")?,
        prompts_dir: prompts_dir.ok_or("restore-dir requires --prompts-dir")?,
        out_dir,
        only_photo,
        model,
        dry_run,
    })
}

fn parse_count(flag: &str, value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("{flag} must be a positive integer, got {value:?}")),
    }
}
