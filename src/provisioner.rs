use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};
use zip::ZipArchive;

use crate::errors::{LangIdError, Result};
use crate::registry::{ModelDescriptor, ModelRegistry};
use crate::traits::ArchiveFetcher;

/// Name of the archive while it is being downloaded into the model directory.
pub const TEMP_ARCHIVE_NAME: &str = "temp_download.zip";

const DOWNLOAD_CHUNK_SIZE: usize = 8192;

/// Blocking HTTP transport for model archives.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    /// `None` disables the request timeout entirely.
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LangIdError::Network {
                url: String::new(),
                source: Box::new(e),
            })?;
        Ok(Self { client })
    }
}

impl ArchiveFetcher for HttpFetcher {
    fn open(&self, url: &str) -> Result<Box<dyn Read>> {
        let network_err = |e: reqwest::Error| LangIdError::Network {
            url: url.to_string(),
            source: Box::new(e),
        };

        // An empty URL fails here, before anything is written to disk.
        let response = self
            .client
            .get(url)
            .send()
            .map_err(network_err)?
            .error_for_status()
            .map_err(network_err)?;

        Ok(Box::new(response))
    }
}

/// Resolves model keys to local directories, downloading and unpacking the
/// model archive the first time a key is asked for.
///
/// An existing directory is trusted as-is: there is no integrity or freshness
/// check, and a download that fails half way leaves its directory behind.
pub struct ModelProvisioner<F: ArchiveFetcher> {
    registry: ModelRegistry,
    fetcher: F,
}

impl<F: ArchiveFetcher> ModelProvisioner<F> {
    pub const fn new(registry: ModelRegistry, fetcher: F) -> Self {
        Self { registry, fetcher }
    }

    pub const fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub const fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn descriptor(&self, model_key: &str) -> Result<&ModelDescriptor> {
        self.registry.get(model_key)
    }

    pub fn ensure(&self, model_key: &str) -> Result<PathBuf> {
        let descriptor = self.registry.get(model_key)?;
        let model_path = &descriptor.local_path;

        if model_path.exists() {
            info!(path = %model_path.display(), "Model folder already exists");
            return Ok(model_path.clone());
        }

        info!(
            model = model_key,
            url = %descriptor.remote_archive_url,
            "Model not found locally, downloading"
        );
        let body = self.fetcher.open(&descriptor.remote_archive_url)?;

        fs::create_dir_all(model_path).map_err(|e| LangIdError::FileSystem {
            path: model_path.clone(),
            operation: "モデルディレクトリ作成".to_string(),
            source: e,
        })?;

        let archive_path = model_path.join(TEMP_ARCHIVE_NAME);
        let bytes = download_to(body, &archive_path, &descriptor.remote_archive_url)?;
        debug!(bytes, path = %archive_path.display(), "Archive downloaded");

        let extracted = extract_archive(&archive_path, model_path)?;
        info!(files = extracted, path = %model_path.display(), "Extracted files");

        fs::remove_file(&archive_path).map_err(|e| LangIdError::FileSystem {
            path: archive_path.clone(),
            operation: "一時アーカイブ削除".to_string(),
            source: e,
        })?;

        info!(path = %model_path.display(), "Downloaded and extracted model");
        Ok(model_path.clone())
    }
}

/// Stream `body` into `dest` in fixed-size chunks, returning the byte count.
fn download_to(mut body: Box<dyn Read>, dest: &Path, url: &str) -> Result<u64> {
    let fs_err = |e: io::Error| LangIdError::FileSystem {
        path: dest.to_path_buf(),
        operation: "アーカイブ書き込み".to_string(),
        source: e,
    };

    let mut writer = BufWriter::new(File::create(dest).map_err(fs_err)?);
    let mut buffer = [0u8; DOWNLOAD_CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        let read = match body.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(LangIdError::Network {
                    url: url.to_string(),
                    source: Box::new(e),
                })
            }
        };
        writer.write_all(&buffer[..read]).map_err(fs_err)?;
        total += read as u64;
    }

    writer.flush().map_err(fs_err)?;
    Ok(total)
}

/// Unpack every entry of the zip at `archive_path` into `dest`.
///
/// Entries whose names would escape `dest` make the whole archive invalid.
pub fn extract_archive(archive_path: &Path, dest: &Path) -> Result<usize> {
    let corrupt = |source: Box<dyn std::error::Error + Send + Sync>| LangIdError::CorruptArchive {
        path: archive_path.to_path_buf(),
        source,
    };

    let file = File::open(archive_path).map_err(|e| LangIdError::FileSystem {
        path: archive_path.to_path_buf(),
        operation: "アーカイブ読み込み".to_string(),
        source: e,
    })?;
    let mut archive = ZipArchive::new(file).map_err(|e| corrupt(Box::new(e)))?;

    let mut extracted = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| corrupt(Box::new(e)))?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(corrupt(Box::new(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsafe entry path: {}", entry.name()),
            ))));
        };
        let out_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|e| LangIdError::FileSystem {
                path: parent.to_path_buf(),
                operation: "展開先ディレクトリ作成".to_string(),
                source: e,
            })?;
        }
        let mut out = File::create(&out_path).map_err(|e| LangIdError::FileSystem {
            path: out_path.clone(),
            operation: "展開ファイル作成".to_string(),
            source: e,
        })?;
        io::copy(&mut entry, &mut out).map_err(|e| corrupt(Box::new(e)))?;
        extracted += 1;
    }

    Ok(extracted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{build_zip_archive, MockFetcher};
    use crate::registry::ModelDescriptor;
    use tempfile::TempDir;

    fn registry_in(root: &Path, url: &str) -> ModelRegistry {
        ModelRegistry::new(vec![ModelDescriptor::new(
            "hindi",
            root.join("models/he"),
            url,
            &["hindi", "english"],
        )])
    }

    #[test]
    fn test_existing_directory_skips_network() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let model_dir = temp_dir.path().join("models/he");
        fs::create_dir_all(&model_dir)?;

        let provisioner = ModelProvisioner::new(registry_in(temp_dir.path(), ""), MockFetcher::failing());

        assert_eq!(provisioner.ensure("hindi")?, model_dir);
        assert_eq!(provisioner.fetcher().calls(), 0);
        Ok(())
    }

    #[test]
    fn test_download_extracts_and_removes_archive() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let archive = build_zip_archive(&[
            ("config.json", br#"{"id2label":{"0":"hindi","1":"english"}}"#.as_slice()),
            ("onnx/model.onnx", b"weights".as_slice()),
        ]);
        let provisioner = ModelProvisioner::new(
            registry_in(temp_dir.path(), "https://example.invalid/he.zip"),
            MockFetcher::serving(archive),
        );

        let path = provisioner.ensure("hindi")?;

        assert!(path.join("config.json").is_file());
        assert_eq!(fs::read(path.join("onnx/model.onnx"))?, b"weights");
        assert!(!path.join(TEMP_ARCHIVE_NAME).exists());
        assert_eq!(
            provisioner.fetcher().requested_urls(),
            vec!["https://example.invalid/he.zip".to_string()]
        );
        Ok(())
    }

    #[test]
    fn test_ensure_twice_downloads_once() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let archive = build_zip_archive(&[("model.onnx", b"weights".as_slice())]);
        let provisioner = ModelProvisioner::new(
            registry_in(temp_dir.path(), "https://example.invalid/he.zip"),
            MockFetcher::serving(archive),
        );

        let first = provisioner.ensure("hindi")?;
        let second = provisioner.ensure("hindi")?;

        assert_eq!(first, second);
        assert_eq!(provisioner.fetcher().calls(), 1);
        Ok(())
    }

    #[test]
    fn test_unknown_model_key() {
        let provisioner = ModelProvisioner::new(ModelRegistry::builtin(), MockFetcher::failing());
        assert!(matches!(
            provisioner.ensure("klingon"),
            Err(LangIdError::UnknownModel { .. })
        ));
        assert_eq!(provisioner.fetcher().calls(), 0);
    }

    #[test]
    fn test_network_failure_leaves_no_directory() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let provisioner =
            ModelProvisioner::new(registry_in(temp_dir.path(), ""), MockFetcher::failing());

        let result = provisioner.ensure("hindi");

        assert!(matches!(result, Err(LangIdError::Network { .. })));
        assert!(!temp_dir.path().join("models/he").exists());
        Ok(())
    }

    #[test]
    fn test_empty_url_fails_with_network_error() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let provisioner =
            ModelProvisioner::new(registry_in(temp_dir.path(), ""), HttpFetcher::new(None)?);

        assert!(matches!(
            provisioner.ensure("hindi"),
            Err(LangIdError::Network { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_corrupt_archive_leaves_partial_directory() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let provisioner = ModelProvisioner::new(
            registry_in(temp_dir.path(), "https://example.invalid/he.zip"),
            MockFetcher::serving(b"<html>not a zip</html>".to_vec()),
        );

        let result = provisioner.ensure("hindi");

        assert!(matches!(result, Err(LangIdError::CorruptArchive { .. })));
        let model_dir = temp_dir.path().join("models/he");
        assert!(model_dir.is_dir());
        assert!(model_dir.join(TEMP_ARCHIVE_NAME).exists());
        Ok(())
    }

    #[test]
    fn test_path_traversal_entry_is_rejected() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let archive_path = temp_dir.path().join("evil.zip");
        fs::write(
            &archive_path,
            build_zip_archive(&[("../escape.txt", b"x".as_slice())]),
        )?;
        let dest = temp_dir.path().join("out");
        fs::create_dir_all(&dest)?;

        let result = extract_archive(&archive_path, &dest);

        assert!(matches!(result, Err(LangIdError::CorruptArchive { .. })));
        assert!(!temp_dir.path().join("escape.txt").exists());
        Ok(())
    }

    #[test]
    fn test_corrupt_archive_error_names_archive() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let archive_path = temp_dir.path().join(TEMP_ARCHIVE_NAME);
        fs::write(&archive_path, b"PK not really")?;

        match extract_archive(&archive_path, temp_dir.path()) {
            Err(LangIdError::CorruptArchive { path, .. }) => assert_eq!(path, archive_path),
            other => panic!("unexpected result: {other:?}"),
        }
        Ok(())
    }
}
