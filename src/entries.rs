use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::errors::{LangIdError, Result};

/// Suffixes accepted as images. Matching is case-sensitive: `scan.PNG` is skipped.
pub const IMAGE_SUFFIXES: [&str; 3] = [".png", ".jpg", ".jpeg"];

/// A directory entry tagged before the batch loop runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    Image(PathBuf),
    Skipped(PathBuf),
}

impl EntryKind {
    pub fn path(&self) -> &Path {
        match self {
            Self::Image(path) | Self::Skipped(path) => path,
        }
    }

    pub const fn is_image(&self) -> bool {
        matches!(self, Self::Image(_))
    }
}

pub fn is_supported_image(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| IMAGE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)))
}

pub fn classify_entry(path: PathBuf) -> EntryKind {
    if !path.is_dir() && is_supported_image(&path) {
        EntryKind::Image(path)
    } else {
        EntryKind::Skipped(path)
    }
}

/// Tag the immediate children of `dir` (no recursion), in the order the
/// platform lists them. No sorting is applied.
pub fn scan_directory(dir: &Path) -> Result<Vec<EntryKind>> {
    if !dir.is_dir() {
        return Err(LangIdError::FileSystem {
            path: dir.to_path_buf(),
            operation: "ディレクトリ存在確認".to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "入力ディレクトリが存在しません",
            ),
        });
    }

    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .map(|entry| {
            entry
                .map(|e| classify_entry(e.into_path()))
                .map_err(|e| LangIdError::FileSystem {
                    path: dir.to_path_buf(),
                    operation: "ディレクトリ走査".to_string(),
                    source: e.into(),
                })
        })
        .collect()
}
