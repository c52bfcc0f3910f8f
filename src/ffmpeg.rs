use crate::assembler::TrimWriter;
use crate::clip::SourceClip;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;

fn run_cmd_blocking(args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Ok(());
    }

    let mut cmd = std::process::Command::new(&args[0]);
    if args.len() > 1 {
        cmd.args(&args[1..]);
    }

    let status = cmd.status().context("Command execution failed")?;
    if !status.success() {
        return Err(anyhow::anyhow!("Command failed: {:?}", args));
    }

    Ok(())
}

pub async fn ffprobe_duration_seconds(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .context("ffprobe duration failed")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffprobe failed for {}", path.display()));
    }

    parse_probe_duration(&String::from_utf8_lossy(&output.stdout))
}

fn parse_probe_duration(text: &str) -> Result<f64> {
    let duration = text.trim().parse::<f64>().unwrap_or(-1.0);
    if !duration.is_finite() || duration <= 0.1 {
        return Err(anyhow::anyhow!("Invalid duration: {:?}", text.trim()));
    }
    Ok(duration)
}

/// Writes each cut as a video-only H.264 file next to its siblings.
///
/// Artifact names encode the millisecond range, so repeating a call with the
/// same arguments overwrites the same file.
pub struct FfmpegTrimmer {
    source_dir: PathBuf,
    output_dir: PathBuf,
}

impl FfmpegTrimmer {
    pub fn new(source_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn artifact_path(&self, source: &SourceClip, start: f64, end: f64) -> PathBuf {
        let stem = Path::new(&source.identifier)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.identifier.clone());
        let start_ms = (start * 1000.0).round() as u64;
        let end_ms = (end * 1000.0).round() as u64;
        self.output_dir
            .join(format!("{}_{}_{}.mp4", stem, start_ms, end_ms))
    }

    fn trim_args(&self, source: &SourceClip, start: f64, end: f64, out_mp4: &Path) -> Vec<String> {
        let input = self.source_dir.join(&source.identifier);
        vec![
            "ffmpeg".to_string(),
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-ss".to_string(),
            format!("{:.3}", start),
            "-i".to_string(),
            input.display().to_string(),
            "-t".to_string(),
            format!("{:.3}", end - start),
            "-an".to_string(),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
            "-preset".to_string(),
            "veryfast".to_string(),
            "-crf".to_string(),
            "22".to_string(),
            out_mp4.display().to_string(),
        ]
    }
}

impl TrimWriter for FfmpegTrimmer {
    fn trim(&mut self, source: &SourceClip, start: f64, end: f64) -> Result<PathBuf> {
        if end <= start {
            anyhow::bail!(
                "Empty cut for {}: {:.3}-{:.3}",
                source.identifier,
                start,
                end
            );
        }

        std::fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("Failed to create dir {}", self.output_dir.display())
        })?;

        let out_mp4 = self.artifact_path(source, start, end);
        run_cmd_blocking(&self.trim_args(source, start, end, &out_mp4))
            .with_context(|| format!("ffmpeg trim failed for {}", source.identifier))?;

        if !out_mp4.exists() {
            anyhow::bail!("ffmpeg produced no output at {}", out_mp4.display());
        }
        Ok(out_mp4)
    }

    fn discard(&mut self, artifact: &Path) -> Result<()> {
        match std::fs::remove_file(artifact) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("Failed to remove {}", artifact.display())),
        }
    }
}
