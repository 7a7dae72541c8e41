use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::{DynamicImage, GenericImageView};
use parking_lot::Mutex;

use crate::errors::{LangIdError, Result};
use crate::prediction::LabelScore;
use crate::registry::ModelDescriptor;
use crate::traits::{ArchiveFetcher, ClassifierLoader, LanguageClassifier};

/// テスト用のモック分類器
///
/// 画像の幅ごとに勝ちラベルを切り替えられる。指定のない幅は既定ラベルになる
#[derive(Debug, Clone)]
pub struct MockClassifier {
    labels: Vec<String>,
    default_label: String,
    label_by_width: HashMap<u32, String>,
    fail_on_width: Option<u32>,
}

impl MockClassifier {
    pub fn always(label: &str, labels: &[&str]) -> Self {
        Self {
            labels: labels.iter().map(|s| s.to_string()).collect(),
            default_label: label.to_string(),
            label_by_width: HashMap::new(),
            fail_on_width: None,
        }
    }

    pub fn with_label_for_width(mut self, width: u32, label: &str) -> Self {
        self.label_by_width.insert(width, label.to_string());
        self
    }

    pub const fn failing_on_width(mut self, width: u32) -> Self {
        self.fail_on_width = Some(width);
        self
    }
}

impl LanguageClassifier for MockClassifier {
    fn classify(&self, img: &DynamicImage) -> Result<Vec<LabelScore>> {
        let (width, _) = img.dimensions();
        if self.fail_on_width == Some(width) {
            return Err(LangIdError::Classification {
                path: "mock".to_string(),
                reason: format!("forced failure for width {width}"),
            });
        }

        let winner = self
            .label_by_width
            .get(&width)
            .unwrap_or(&self.default_label);

        // テスト用の簡易実装：勝ちラベルに 0.9、残りに小さいスコアを配る
        let mut scores: Vec<_> = self
            .labels
            .iter()
            .map(|label| LabelScore::new(label.clone(), if label == winner { 0.9 } else { 0.05 }))
            .collect();
        if !self.labels.contains(winner) {
            scores.push(LabelScore::new(winner.clone(), 0.9));
        }
        Ok(scores)
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }
}

/// テスト用のローダー：ロード回数を数え、存在しないディレクトリは拒否する
#[derive(Debug)]
pub struct MockLoader {
    classifier: MockClassifier,
    loads: AtomicUsize,
}

impl MockLoader {
    pub const fn new(classifier: MockClassifier) -> Self {
        Self {
            classifier,
            loads: AtomicUsize::new(0),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ClassifierLoader for MockLoader {
    type Classifier = MockClassifier;

    fn load(&self, model_dir: &Path, _descriptor: &ModelDescriptor) -> Result<MockClassifier> {
        if !model_dir.is_dir() {
            return Err(LangIdError::Model {
                operation: format!("モデル読み込み: {}", model_dir.display()),
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "モデルディレクトリが存在しません",
                )),
            });
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.classifier.clone())
    }
}

/// テスト用のアーカイブ取得：メモリ上の zip を返し、要求された URL を記録する
#[derive(Debug)]
pub struct MockFetcher {
    archive: Option<Vec<u8>>,
    requested: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn serving(archive: Vec<u8>) -> Self {
        Self {
            archive: Some(archive),
            requested: Mutex::new(Vec::new()),
        }
    }

    /// 常にネットワークエラーを返す
    pub fn failing() -> Self {
        Self {
            archive: None,
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requested.lock().len()
    }

    pub fn requested_urls(&self) -> Vec<String> {
        self.requested.lock().clone()
    }
}

impl ArchiveFetcher for MockFetcher {
    fn open(&self, url: &str) -> Result<Box<dyn Read>> {
        self.requested.lock().push(url.to_string());
        match &self.archive {
            Some(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
            None => Err(LangIdError::Network {
                url: url.to_string(),
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "mock network unavailable",
                )),
            }),
        }
    }
}

/// テスト用の zip アーカイブをメモリ上に作る
pub fn build_zip_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored);

    for (name, content) in files {
        writer
            .start_file(*name, options)
            .expect("zip entry should start");
        writer.write_all(content).expect("zip entry should be written");
    }

    writer.finish().expect("zip should finish").into_inner()
}
