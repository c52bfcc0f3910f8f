use anyhow::Result;
use stock_shorts::assembler::CancellationToken;
use stock_shorts::config::PipelineConfig;
use stock_shorts::{init, pipeline};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cfg = PipelineConfig::load("config.json").await?;

    if !init::check_ffmpeg().await {
        eprintln!("[WARNING] ffmpeg/ffprobe not found in PATH. Please install FFmpeg.");
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("[INFO] Interrupt received; stopping after the current pass.");
            on_signal.cancel();
        }
    });

    let manifest = pipeline::run_assembly(&cfg, cancel).await?;
    println!(
        "{} segments, {:.2}s -> {}",
        manifest.segments.len(),
        manifest.accumulated_duration,
        cfg.manifest_path.display()
    );
    Ok(())
}
