use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use indic_lid_rs::{Config, LanguageIdentifier, RunMode};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::parse();

    // 引数不足はメッセージを標準出力に出して正常終了する
    let Some(mode) = config.mode_to(&mut std::io::stdout().lock())? else {
        return Ok(());
    };

    let identifier = LanguageIdentifier::with_onnx_model(&config)?;

    match mode {
        RunMode::Single { image_path } => {
            identifier.predict_single(&image_path, &config.model_name)?;
        }
        RunMode::Batch {
            image_dir,
            show_timing,
            output_csv,
        } => {
            let written =
                identifier.predict_batch(&image_dir, &config.model_name, show_timing, &output_csv)?;
            println!("{}", written.display());
        }
    }

    Ok(())
}
