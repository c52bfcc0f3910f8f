use crate::config::PipelineConfig;
use crate::logi;
use anyhow::Result;
use std::path::Path;
use tokio::fs;

pub async fn ensure_directories(cfg: &PipelineConfig) -> Result<()> {
    let dirs = [
        cfg.source_dir.as_path(),
        cfg.output_dir.as_path(),
        cfg.music_dir.as_path(),
        cfg.caption_dir.as_path(),
        cfg.state_dir.as_path(),
    ];
    for dir in dirs {
        if !Path::new(dir).exists() {
            fs::create_dir_all(dir).await?;
            logi(format!("Created directory: {}", dir.display()));
        }
    }
    Ok(())
}

pub async fn check_ffmpeg() -> bool {
    for tool in ["ffmpeg", "ffprobe"] {
        let found = match tokio::process::Command::new(tool)
            .arg("-version")
            .output()
            .await
        {
            Ok(output) => output.status.success(),
            Err(_) => false,
        };
        if !found {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_missing_dirs() {
        let root = tempfile::tempdir().unwrap();
        let cfg = PipelineConfig {
            source_dir: root.path().join("footages"),
            output_dir: root.path().join("cut_videos"),
            music_dir: root.path().join("music"),
            caption_dir: root.path().join("captions"),
            state_dir: root.path().join("state"),
            ..PipelineConfig::default()
        };

        ensure_directories(&cfg).await.unwrap();
        for dir in [
            &cfg.source_dir,
            &cfg.output_dir,
            &cfg.music_dir,
            &cfg.caption_dir,
            &cfg.state_dir,
        ] {
            assert!(dir.is_dir(), "{} missing", dir.display());
        }
        ensure_directories(&cfg).await.unwrap();
    }
}
