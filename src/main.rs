use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use retouch_rs::tracing_config::init_tracing;
use retouch_rs::validation::{format_file_size, size_advice, ImageMime};
use retouch_rs::{
    Config, ImageSizeReducer, OnnxRemover, ProcessingSession, ProgressBarObserver, SourceImage,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    init_tracing(config.verbose)?;

    ensure!(
        config.input.exists(),
        "Input path does not exist: {}",
        config.input.display()
    );
    ensure!(
        config.model_dir.is_dir(),
        "Model directory does not exist: {}",
        config.model_dir.display()
    );

    let inputs = collect_inputs(&config.input);
    ensure!(
        !inputs.is_empty(),
        "No supported images found in {}",
        config.input.display()
    );

    fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "Failed to create output directory: {}",
            config.output_dir.display()
        )
    })?;

    let settings = config.quality_settings();
    info!(
        images = inputs.len(),
        model = settings.model.model_name(),
        format = settings.output_format.extension(),
        strokes = config.strokes.len(),
        "Starting"
    );

    if !settings.output_format.supports_alpha() {
        warn!(
            format = settings.output_format.extension(),
            "Output format has no alpha channel, removed background will be flattened"
        );
    }

    let remover = OnnxRemover::new(&config.model_dir, config.device_id);
    let mut failed = 0usize;
    for path in &inputs {
        if let Err(e) = process_file(path, &config, &remover).await {
            error!(path = %path.display(), "{e:#}");
            failed += 1;
        }
    }

    ensure!(failed == 0, "{failed} of {} images failed", inputs.len());
    Ok(())
}

fn collect_inputs(input: &Path) -> Vec<PathBuf> {
    if input.is_file() {
        return vec![input.to_path_buf()];
    }

    WalkDir::new(input)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .and_then(ImageMime::from_extension)
                .is_some()
        })
        .map(|e| e.into_path())
        .collect()
}

async fn process_file(path: &Path, config: &Config, remover: &OnnxRemover) -> Result<()> {
    let source = SourceImage::from_path(path)?;
    if let Some(advice) = size_advice(source.byte_len()) {
        warn!(name = source.name(), "{advice}");
    }

    let mut session = ProcessingSession::new(remover.clone(), ImageSizeReducer::new())
        .with_settings(config.quality_settings())
        .with_reduction_options(config.reduction_options());
    session.add_observer(Arc::new(ProgressBarObserver::new(source.name())));

    let record = session
        .process(source)
        .await
        .with_context(|| format!("Failed to process {}", path.display()))?;

    let stem = record.original.stem();
    let result_path = config.output_dir.join(format!(
        "{stem}-bg-removed.{}",
        record.result.format.extension()
    ));
    fs::write(&result_path, &record.result.bytes)
        .with_context(|| format!("Failed to save image: {}", result_path.display()))?;
    info!(
        path = %result_path.display(),
        size = format_file_size(record.result.bytes.len() as u64),
        duration_ms = record.processing_duration_ms,
        "Saved result"
    );

    if config.strokes.is_empty() {
        return Ok(());
    }

    let mut editor = record.open_editor(config.working_size())?;
    for stroke in &config.strokes {
        stroke.replay(&mut editor)?;
    }

    let edited_path = config.output_dir.join(format!("{stem}-edited.png"));
    fs::write(&edited_path, editor.export_png()?)
        .with_context(|| format!("Failed to save image: {}", edited_path.display()))?;
    info!(path = %edited_path.display(), "Saved edited result");

    Ok(())
}
