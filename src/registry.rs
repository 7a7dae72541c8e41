use std::path::{Path, PathBuf};

use crate::errors::{LangIdError, Result};

const ASSAMESE_ARCHIVE_URL: &str =
    "https://github.com/adityarathor007/test/releases/download/V1/hea.zip";

/// A pretrained language-family classifier and where it lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDescriptor {
    pub key: String,
    pub local_path: PathBuf,
    /// Empty means the model cannot be fetched.
    pub remote_archive_url: String,
    pub subcategories: Vec<String>,
}

impl ModelDescriptor {
    pub fn new(
        key: impl Into<String>,
        local_path: impl Into<PathBuf>,
        remote_archive_url: impl Into<String>,
        subcategories: &[&str],
    ) -> Self {
        Self {
            key: key.into(),
            local_path: local_path.into(),
            remote_archive_url: remote_archive_url.into(),
            subcategories: subcategories.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Immutable table of known models, built once at startup and handed to the
/// provisioner and the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRegistry {
    descriptors: Vec<ModelDescriptor>,
}

impl ModelRegistry {
    pub fn new(descriptors: Vec<ModelDescriptor>) -> Self {
        Self { descriptors }
    }

    /// The shipped models: Hindi/English plus one regional script each.
    pub fn builtin() -> Self {
        let regional = |key: &str, dir: &str, url: &str| {
            ModelDescriptor::new(
                key,
                Path::new("models").join(dir),
                url,
                &["hindi", "english", key],
            )
        };

        Self::new(vec![
            ModelDescriptor::new("hindi", "models/he", "", &["hindi", "english"]),
            regional("assamese", "hea", ASSAMESE_ARCHIVE_URL),
            regional("bengali", "heb", ""),
            regional("gujarati", "heg", ""),
            regional("kannada", "hek", ""),
            regional("malayalam", "hem", ""),
            regional("marathi", "hema", ""),
            regional("meitei", "heme", ""),
            regional("odia", "heo", ""),
            regional("punjabi", "hep", ""),
            regional("tamil", "het", ""),
            regional("telugu", "hetu", ""),
            regional("urdu", "heu", ""),
        ])
    }

    /// Rebase every relative local path under `root`. `.` and the empty path
    /// leave the registry untouched.
    pub fn rooted_at(&self, root: &Path) -> Self {
        if root.as_os_str().is_empty() || root == Path::new(".") {
            return self.clone();
        }

        let descriptors = self
            .descriptors
            .iter()
            .map(|d| {
                let mut d = d.clone();
                if d.local_path.is_relative() {
                    d.local_path = root.join(&d.local_path);
                }
                d
            })
            .collect();
        Self { descriptors }
    }

    pub fn get(&self, key: &str) -> Result<&ModelDescriptor> {
        self.descriptors
            .iter()
            .find(|d| d.key == key)
            .ok_or_else(|| LangIdError::UnknownModel {
                key: key.to_string(),
            })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.descriptors.iter().map(|d| d.key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.descriptors.iter()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
