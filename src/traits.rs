use std::io::Read;
use std::path::Path;

use image::DynamicImage;

use crate::errors::Result;
use crate::prediction::LabelScore;
use crate::registry::ModelDescriptor;

/// 画像分類モデルの抽象化
///
/// 依存関係逆転原則（DIP）に従い、ONNX Runtime の具象実装ではなく抽象に依存する
pub trait LanguageClassifier {
    /// 画像を分類し、候補ラベルごとのスコアを返す
    fn classify(&self, img: &DynamicImage) -> Result<Vec<LabelScore>>;

    /// モデルが出力しうるラベル
    fn labels(&self) -> &[String];
}

/// プロビジョニング済みディレクトリから分類器を構築する
pub trait ClassifierLoader {
    type Classifier: LanguageClassifier;

    fn load(&self, model_dir: &Path, descriptor: &ModelDescriptor) -> Result<Self::Classifier>;
}

/// モデルアーカイブの取得元
///
/// テストではネットワークアクセスの回数を数えるためにモックへ差し替える
pub trait ArchiveFetcher {
    /// アーカイブ本体をストリームとして開く
    fn open(&self, url: &str) -> Result<Box<dyn Read>>;
}
