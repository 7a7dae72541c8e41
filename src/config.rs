use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::{LangIdError, Result};
use crate::registry::ModelRegistry;
use crate::report::DEFAULT_OUTPUT_CSV;

#[derive(Parser, Clone, Debug)]
#[command(version, about = "Identify the script of Indic text images", long_about = None)]
pub struct Config {
    /// Path to the input image
    #[arg(long, alias = "image_path")]
    pub image_path: Option<PathBuf>,

    /// Path to the input image directory
    #[arg(long, alias = "image_dir")]
    pub image_dir: Option<PathBuf>,

    /// Name of the model (e.g. hindi, assamese, tamil)
    #[arg(short, long, alias = "model_name", value_parser = check_model_name)]
    pub model_name: String,

    /// Process images in batch mode
    #[arg(long)]
    pub batch: bool,

    /// Print the time required to process a batch of images
    #[arg(long)]
    pub time: bool,

    #[arg(short, long, default_value = DEFAULT_OUTPUT_CSV)]
    pub output_csv: PathBuf,

    /// Directory the registry's relative model paths are resolved against
    #[arg(long, default_value = ".")]
    pub models_root: PathBuf,

    #[arg(short, long, default_value_t = 0)]
    pub device_id: i32,

    /// No timeout when unset
    #[arg(long)]
    pub download_timeout_secs: Option<u64>,
}

/// What a single invocation does once arguments are validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    Single {
        image_path: PathBuf,
    },
    Batch {
        image_dir: PathBuf,
        show_timing: bool,
        output_csv: PathBuf,
    },
}

impl Config {
    pub fn mode(&self) -> Result<RunMode> {
        if self.batch {
            let image_dir = self
                .image_dir
                .clone()
                .ok_or_else(|| LangIdError::MissingArguments {
                    message: "image_dir is required when batch is set to True.".to_string(),
                })?;
            Ok(RunMode::Batch {
                image_dir,
                show_timing: self.time,
                output_csv: self.output_csv.clone(),
            })
        } else {
            let image_path = self
                .image_path
                .clone()
                .ok_or_else(|| LangIdError::MissingArguments {
                    message: "image_path is required when batch is not set.".to_string(),
                })?;
            Ok(RunMode::Single { image_path })
        }
    }

    /// `mode` for the CLI: a missing argument is printed to `out` and yields `None`.
    pub fn mode_to<W: Write>(&self, out: &mut W) -> Result<Option<RunMode>> {
        match self.mode() {
            Ok(mode) => Ok(Some(mode)),
            Err(err @ LangIdError::MissingArguments { .. }) => {
                writeln!(out, "{}", err)?;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    pub fn download_timeout(&self) -> Option<Duration> {
        self.download_timeout_secs.map(Duration::from_secs)
    }

    pub fn registry(&self) -> ModelRegistry {
        ModelRegistry::builtin().rooted_at(&self.models_root)
    }
}

fn check_model_name(s: &str) -> std::result::Result<String, String> {
    let registry = ModelRegistry::builtin();
    if registry.keys().any(|key| key == s) {
        return Ok(s.to_string());
    }

    let supported: Vec<_> = registry.keys().map(|k| format!("`{}`", k)).collect();
    Err(format!(
        "{} is not a known model. Supported models: {}",
        s,
        supported.join(", ")
    ))
}
