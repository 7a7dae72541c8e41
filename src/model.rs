use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use image::{imageops, imageops::FilterType, DynamicImage};
use ndarray::prelude::*;
use nshare::AsNdarray3;
use ort::value::TensorRef;
use ort::{
    execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider},
    session::Session,
};
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::debug;

use crate::errors::{LangIdError, Result};
use crate::prediction::LabelScore;
use crate::registry::ModelDescriptor;
use crate::traits::{ClassifierLoader, LanguageClassifier};

/// Where an exported model may keep its graph, relative to the model directory.
const MODEL_FILE_CANDIDATES: [&str; 2] = ["model.onnx", "onnx/model.onnx"];
const MODEL_CONFIG_FILE: &str = "config.json";
const PREPROCESSOR_CONFIG_FILE: &str = "preprocessor_config.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ImageSize {
    Square(u32),
    Sized { height: u32, width: u32 },
}

impl ImageSize {
    pub const fn dimensions(&self) -> (u32, u32) {
        match *self {
            Self::Square(side) => (side, side),
            Self::Sized { height, width } => (width, height),
        }
    }
}

/// Image transform expected by the exported ViT graph.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub do_resize: bool,
    pub do_rescale: bool,
    pub do_normalize: bool,
    pub size: ImageSize,
    pub rescale_factor: f32,
    pub image_mean: [f32; 3],
    pub image_std: [f32; 3],
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            do_resize: true,
            do_rescale: true,
            do_normalize: true,
            size: ImageSize::Square(224),
            rescale_factor: 1.0 / 255.0,
            image_mean: [0.5; 3],
            image_std: [0.5; 3],
        }
    }
}

impl PreprocessConfig {
    /// Read `preprocessor_config.json` from `model_dir`, or fall back to ViT defaults.
    pub fn load(model_dir: &Path) -> Result<Self> {
        let path = model_dir.join(PREPROCESSOR_CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        read_json(&path)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ModelConfig {
    #[serde(default)]
    id2label: BTreeMap<String, String>,
}

/// Resolve output labels in logit order.
///
/// `config.json`'s `id2label` wins and each label lands at its own id; without it the registry subcategories are
/// used in their declared order.
pub fn resolve_labels(model_dir: &Path, descriptor: &ModelDescriptor) -> Result<Vec<String>> {
    let path = model_dir.join(MODEL_CONFIG_FILE);
    if !path.exists() {
        return Ok(descriptor.subcategories.clone());
    }

    let config: ModelConfig = read_json(&path)?;
    if config.id2label.is_empty() {
        return Ok(descriptor.subcategories.clone());
    }

    let indexed = config
        .id2label
        .into_iter()
        .map(|(id, label)| {
            id.parse::<usize>()
                .map(|id| (id, label))
                .map_err(|e| LangIdError::Model {
                    operation: format!("ラベル ID 解析: {}", path.display()),
                    source: Box::new(e),
                })
        })
        .collect::<Result<BTreeMap<usize, String>>>()?;

    // ID の欠番は LABEL_<i> で埋め、各ラベルを自分の ID の位置に置く
    let len = indexed.keys().next_back().map_or(0, |max| max + 1);
    Ok((0..len)
        .map(|i| {
            indexed
                .get(&i)
                .cloned()
                .unwrap_or_else(|| format!("LABEL_{i}"))
        })
        .collect())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|e| LangIdError::FileSystem {
        path: path.to_path_buf(),
        operation: "設定ファイル読み込み".to_string(),
        source: e,
    })?;
    serde_json::from_str(&content).map_err(|e| LangIdError::Model {
        operation: format!("設定ファイル解析: {}", path.display()),
        source: Box::new(e),
    })
}

pub fn find_model_file(model_dir: &Path) -> Result<PathBuf> {
    MODEL_FILE_CANDIDATES
        .iter()
        .map(|name| model_dir.join(name))
        .find(|path| path.is_file())
        .ok_or_else(|| LangIdError::Model {
            operation: format!("モデルファイル探索: {}", model_dir.display()),
            source: Box::new(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "model.onnx が見つかりません",
            )),
        })
}

/// ViT classifier running on ONNX Runtime.
pub struct OnnxClassifier {
    labels: Vec<String>,
    preprocess: PreprocessConfig,
    output_name: String,
    session: Mutex<Session>,
}

impl OnnxClassifier {
    pub fn new(model_dir: &Path, descriptor: &ModelDescriptor, device_id: i32) -> Result<Self> {
        let model_file = find_model_file(model_dir)?;
        let labels = resolve_labels(model_dir, descriptor)?;
        let preprocess = PreprocessConfig::load(model_dir)?;

        let session = Session::builder()
            .map_err(|e| model_error("セッションビルダー初期化", e.into()))?
            .with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(device_id)
                    .build(),
            ])
            .map_err(|e| model_error("実行プロバイダー設定", e.into()))?
            .commit_from_file(&model_file)
            .map_err(|e| {
                model_error(
                    format!("モデルファイル読み込み: {}", model_file.display()),
                    e.into(),
                )
            })?;

        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| LangIdError::Model {
                operation: "モデル出力取得".to_string(),
                source: Box::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "モデルに出力がありません",
                )),
            })?;

        debug!(
            model = %model_file.display(),
            labels = ?labels,
            "Classifier loaded"
        );

        Ok(Self {
            labels,
            preprocess,
            output_name,
            session: Mutex::new(session),
        })
    }

    fn predict_logits(&self, tensor: ArrayView4<f32>) -> Result<Vec<f32>> {
        let mut binding = self.session.lock();
        let outputs = binding.run(ort::inputs![TensorRef::from_array_view(
            &tensor.as_standard_layout()
        )?])?;
        let logits = outputs[self.output_name.as_str()].try_extract_array::<f32>()?;
        Ok(logits.iter().copied().collect())
    }
}

impl LanguageClassifier for OnnxClassifier {
    fn classify(&self, img: &DynamicImage) -> Result<Vec<LabelScore>> {
        let tensor = preprocess(img, &self.preprocess);
        let logits = self.predict_logits(tensor.view())?;
        Ok(scores_from_logits(&logits, &self.labels))
    }

    fn labels(&self) -> &[String] {
        &self.labels
    }
}

/// Builds [`OnnxClassifier`]s on a fixed CUDA device (CPU when unavailable).
#[derive(Debug, Clone, Copy)]
pub struct OnnxLoader {
    pub device_id: i32,
}

impl OnnxLoader {
    pub const fn new(device_id: i32) -> Self {
        Self { device_id }
    }
}

impl ClassifierLoader for OnnxLoader {
    type Classifier = OnnxClassifier;

    fn load(&self, model_dir: &Path, descriptor: &ModelDescriptor) -> Result<OnnxClassifier> {
        OnnxClassifier::new(model_dir, descriptor, self.device_id)
    }
}

fn model_error(operation: impl Into<String>, err: ort::Error) -> LangIdError {
    LangIdError::Model {
        operation: operation.into(),
        source: Box::new(err),
    }
}

/// RGB, resize, rescale and normalize into a `1x3xHxW` tensor.
pub fn preprocess(img: &DynamicImage, config: &PreprocessConfig) -> Array4<f32> {
    let rgb = img.to_rgb8();
    let rgb = if config.do_resize {
        let (width, height) = config.size.dimensions();
        imageops::resize(&rgb, width, height, FilterType::Triangle)
    } else {
        rgb
    };

    let mut tensor = rgb.as_ndarray3().mapv(f32::from);
    for (c, mut channel) in tensor.axis_iter_mut(Axis(0)).enumerate() {
        channel.mapv_inplace(|v| {
            let v = if config.do_rescale {
                v * config.rescale_factor
            } else {
                v
            };
            if config.do_normalize {
                (v - config.image_mean[c]) / config.image_std[c]
            } else {
                v
            }
        });
    }

    tensor.insert_axis(Axis(0))
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|v| v / sum).collect()
}

/// Pair softmax scores with labels. Logits past the known labels get `LABEL_<i>`.
pub fn scores_from_logits(logits: &[f32], labels: &[String]) -> Vec<LabelScore> {
    softmax(logits)
        .into_iter()
        .enumerate()
        .map(|(i, score)| {
            let label = labels
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("LABEL_{i}"));
            LabelScore::new(label, score)
        })
        .collect()
}
