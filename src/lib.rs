pub mod config;
pub mod entries;
pub mod errors;
pub mod model;
pub mod prediction;
pub mod provisioner;
pub mod registry;
pub mod report;
pub mod traits;

pub mod mocks;

use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

pub use config::{Config, RunMode};
pub use entries::EntryKind;
pub use errors::{LangIdError, Result};
pub use model::{OnnxClassifier, OnnxLoader};
pub use prediction::{LabelScore, PredictionRecord};
pub use provisioner::{HttpFetcher, ModelProvisioner};
pub use registry::{ModelDescriptor, ModelRegistry};
pub use traits::*;

#[cfg(test)]
pub use mocks::*;

/// Runs script identification over one image or a directory of images.
///
/// The classifier is loaded once per call; a batch reuses it for every image.
pub struct LanguageIdentifier<L: ClassifierLoader, F: ArchiveFetcher> {
    provisioner: ModelProvisioner<F>,
    loader: L,
}

impl<L: ClassifierLoader, F: ArchiveFetcher> LanguageIdentifier<L, F> {
    pub const fn new(provisioner: ModelProvisioner<F>, loader: L) -> Self {
        Self {
            provisioner,
            loader,
        }
    }

    pub const fn provisioner(&self) -> &ModelProvisioner<F> {
        &self.provisioner
    }

    pub const fn loader(&self) -> &L {
        &self.loader
    }

    /// Classify one image and print `image_path: <path>, predicted_label: <label>`.
    ///
    /// Files without a png/jpg/jpeg suffix are ignored: no output, no error.
    /// The printed label is the raw model label.
    pub fn predict_single(
        &self,
        image_path: &Path,
        model_key: &str,
    ) -> Result<Option<PredictionRecord>> {
        self.predict_single_to(image_path, model_key, &mut io::stdout().lock())
    }

    pub fn predict_single_to<W: Write>(
        &self,
        image_path: &Path,
        model_key: &str,
        out: &mut W,
    ) -> Result<Option<PredictionRecord>> {
        let classifier = self.load_classifier(model_key)?;

        if let EntryKind::Skipped(path) = entries::classify_entry(image_path.to_path_buf()) {
            debug!(path = %path.display(), "Unsupported file type, skipping");
            return Ok(None);
        }

        let label = self.classify_path(&classifier, image_path)?;
        writeln!(
            out,
            "image_path: {}, predicted_label: {}",
            image_path.display(),
            label
        )?;

        Ok(Some(PredictionRecord::new(
            image_path.display().to_string(),
            label,
        )))
    }

    /// Classify every image directly inside `image_dir` and write the
    /// `Filepath,Language` report to `output_csv`.
    ///
    /// Rows follow directory-listing order and carry the bare file name and
    /// the capitalized label. The first failing image aborts the batch
    /// before any report is written.
    pub fn predict_batch(
        &self,
        image_dir: &Path,
        model_key: &str,
        show_timing: bool,
        output_csv: &Path,
    ) -> Result<PathBuf> {
        self.predict_batch_to(
            image_dir,
            model_key,
            show_timing,
            output_csv,
            &mut io::stdout().lock(),
        )
    }

    pub fn predict_batch_to<W: Write>(
        &self,
        image_dir: &Path,
        model_key: &str,
        show_timing: bool,
        output_csv: &Path,
        out: &mut W,
    ) -> Result<PathBuf> {
        let classifier = self.load_classifier(model_key)?;
        let start = Instant::now();

        let image_files: Vec<PathBuf> = entries::scan_directory(image_dir)?
            .into_iter()
            .filter_map(|entry| match entry {
                EntryKind::Image(path) => Some(path),
                EntryKind::Skipped(path) => {
                    debug!(path = %path.display(), "Unsupported file type, skipping");
                    None
                }
            })
            .collect();

        let pb = ProgressBar::new(image_files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        let mut records = Vec::with_capacity(image_files.len());
        for image_path in &image_files {
            let label = self.classify_path(&classifier, image_path)?;
            let file_name = image_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            records.push(PredictionRecord::new(
                file_name,
                prediction::capitalize_label(&label),
            ));
            pb.inc(1);
        }
        pb.finish_and_clear();

        let elapsed = start.elapsed();
        info!(
            images = records.len(),
            elapsed_secs = elapsed.as_secs_f64(),
            "Batch classified"
        );
        if show_timing {
            writeln!(
                out,
                "Time taken to process {} images: {:.2} seconds",
                records.len(),
                elapsed.as_secs_f64()
            )?;
        }

        report::write_predictions(output_csv, &records)
    }

    fn load_classifier(&self, model_key: &str) -> Result<L::Classifier> {
        let model_path = self.provisioner.ensure(model_key)?;
        let descriptor = self.provisioner.descriptor(model_key)?;
        let classifier = self.loader.load(&model_path, descriptor)?;
        debug!(model = model_key, labels = ?classifier.labels(), "Loaded classifier");
        Ok(classifier)
    }

    fn classify_path(&self, classifier: &L::Classifier, image_path: &Path) -> Result<String> {
        let img = image::open(image_path).map_err(|e| LangIdError::ImageProcessing {
            path: image_path.display().to_string(),
            operation: "画像読み込み".to_string(),
            source: Box::new(e),
        })?;

        let scores = classifier.classify(&img)?;
        prediction::top_label(&scores)
            .map(|best| best.label.clone())
            .ok_or_else(|| LangIdError::Classification {
                path: image_path.display().to_string(),
                reason: "classifier returned no labels".to_string(),
            })
    }
}

// ONNX Runtime と HTTP ダウンロードを使う本番用の組み立て
impl LanguageIdentifier<OnnxLoader, HttpFetcher> {
    pub fn with_onnx_model(config: &Config) -> Result<Self> {
        let fetcher = HttpFetcher::new(config.download_timeout())?;
        let provisioner = ModelProvisioner::new(config.registry(), fetcher);
        Ok(Self::new(provisioner, OnnxLoader::new(config.device_id)))
    }
}
