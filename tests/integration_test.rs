use image::{DynamicImage, Rgb, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use indic_lid_rs::{
    mocks::{build_zip_archive, MockFetcher},
    ClassifierLoader, LabelScore, LangIdError, LanguageClassifier, LanguageIdentifier,
    ModelDescriptor, ModelProvisioner, ModelRegistry,
};

// テスト用のモック分類器（統合テスト内で定義）
#[derive(Debug, Clone)]
struct TestMockClassifier {
    labels: Vec<String>,
}

impl LanguageClassifier for TestMockClassifier {
    fn classify(&self, _img: &DynamicImage) -> indic_lid_rs::Result<Vec<LabelScore>> {
        Ok(self
            .labels
            .iter()
            .enumerate()
            .map(|(i, label)| LabelScore::new(label.clone(), i as f32))
            .collect())
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }
}

// 記述子のサブカテゴリをそのままラベルとして使うローダー
struct SubcategoryLoader;

impl ClassifierLoader for SubcategoryLoader {
    type Classifier = TestMockClassifier;

    fn load(
        &self,
        _model_dir: &Path,
        descriptor: &ModelDescriptor,
    ) -> indic_lid_rs::Result<TestMockClassifier> {
        Ok(TestMockClassifier {
            labels: descriptor.subcategories.clone(),
        })
    }
}

#[test]
fn test_cached_model_returns_path_without_network() {
    let temp_dir = TempDir::new().unwrap();
    let model_dir = temp_dir.path().join("models/he");
    fs::create_dir_all(&model_dir).unwrap();

    let registry = ModelRegistry::builtin().rooted_at(temp_dir.path());
    let provisioner = ModelProvisioner::new(registry, MockFetcher::failing());

    let path = provisioner.ensure("hindi").unwrap();

    assert_eq!(path, model_dir);
    assert_eq!(provisioner.fetcher().calls(), 0);
}

#[test]
fn test_ensure_is_idempotent_for_every_builtin_model() {
    let temp_dir = TempDir::new().unwrap();
    let archive = build_zip_archive(&[("model.onnx", b"weights".as_slice())]);
    let registry = ModelRegistry::builtin().rooted_at(temp_dir.path());
    let keys: Vec<String> = registry.keys().map(str::to_string).collect();
    let provisioner = ModelProvisioner::new(registry, MockFetcher::serving(archive));

    for key in &keys {
        let first = provisioner.ensure(key).unwrap();
        let second = provisioner.ensure(key).unwrap();
        assert_eq!(first, second, "path changed for {}", key);
        assert!(first.join("model.onnx").is_file());
    }

    assert_eq!(provisioner.fetcher().calls(), keys.len());
}

#[test]
fn test_empty_archive_url_is_requested_verbatim() {
    let temp_dir = TempDir::new().unwrap();
    let registry = ModelRegistry::builtin().rooted_at(temp_dir.path());
    let provisioner = ModelProvisioner::new(registry, MockFetcher::failing());

    let result = provisioner.ensure("tamil");

    assert!(matches!(result, Err(LangIdError::Network { .. })));
    assert_eq!(provisioner.fetcher().requested_urls(), vec![String::new()]);
}

#[test]
fn test_single_prediction_uses_max_score() {
    let temp_dir = TempDir::new().unwrap();
    let registry = ModelRegistry::builtin().rooted_at(temp_dir.path());
    fs::create_dir_all(temp_dir.path().join("models/het")).unwrap();

    let identifier = LanguageIdentifier::new(
        ModelProvisioner::new(registry, MockFetcher::failing()),
        SubcategoryLoader,
    );

    let image_path = temp_dir.path().join("scan.jpeg");
    DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb([200, 10, 10])))
        .save(&image_path)
        .unwrap();

    let mut out = Vec::new();
    let record = identifier
        .predict_single_to(&image_path, "tamil", &mut out)
        .unwrap()
        .unwrap();

    // サブカテゴリの最後のラベルが最大スコアになる
    assert_eq!(record.predicted_label, "tamil");
    assert_eq!(record.file_path, image_path.display().to_string());
    assert_eq!(
        String::from_utf8(out).unwrap(),
        format!("image_path: {}, predicted_label: tamil\n", image_path.display())
    );
}

#[test]
fn test_single_skip_still_provisions_model() {
    let temp_dir = TempDir::new().unwrap();
    let registry = ModelRegistry::builtin().rooted_at(temp_dir.path());
    let identifier = LanguageIdentifier::new(
        ModelProvisioner::new(registry, MockFetcher::failing()),
        SubcategoryLoader,
    );

    // モデルが未取得なら、拡張子に関係なく取得失敗が先に表面化する
    let result = identifier.predict_single_to(&PathBuf::from("notes.txt"), "odia", &mut Vec::new());
    assert!(matches!(result, Err(LangIdError::Network { .. })));
}
