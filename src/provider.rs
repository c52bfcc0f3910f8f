use crate::clip::SourceClip;
use crate::ffmpeg;
use crate::{logi, logw};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Measures the playable length of a local clip.
#[async_trait]
pub trait DurationProbe: Send + Sync {
    async fn duration_seconds(&self, path: &Path) -> Result<f64>;
}

pub struct FfprobeDuration;

#[async_trait]
impl DurationProbe for FfprobeDuration {
    async fn duration_seconds(&self, path: &Path) -> Result<f64> {
        ffmpeg::ffprobe_duration_seconds(path).await
    }
}

async fn list_mp4_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut entries = fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read source dir: {}", dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let is_mp4 = path
            .extension()
            .and_then(OsStr::to_str)
            .map(|s| s.eq_ignore_ascii_case("mp4"))
            == Some(true);
        if is_mp4 {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

/// Build the assembler's source pool from every `.mp4` in `dir`.
///
/// Clips that fail to probe, or that are not longer than `start_margin`,
/// are left out with a warning.
pub async fn scan_source_dir<P>(dir: &Path, probe: &P, start_margin: f64) -> Result<Vec<SourceClip>>
where
    P: DurationProbe + ?Sized,
{
    let mut pool = Vec::new();
    for path in list_mp4_files(dir).await? {
        let Some(identifier) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };

        let duration = match probe.duration_seconds(&path).await {
            Ok(v) => v,
            Err(err) => {
                logw(format!("Skipping {}: {:#}", identifier, err));
                continue;
            }
        };
        if !duration.is_finite() || duration <= start_margin {
            logw(format!(
                "Skipping {} ({:.2}s, needs more than {:.2}s)",
                identifier, duration, start_margin
            ));
            continue;
        }

        pool.push(SourceClip::new(identifier, duration));
    }

    logi(format!("Source pool: {} clips from {}", pool.len(), dir.display()));
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct TableProbe(HashMap<String, f64>);

    #[async_trait]
    impl DurationProbe for TableProbe {
        async fn duration_seconds(&self, path: &Path) -> Result<f64> {
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            self.0
                .get(&name)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("unreadable"))
        }
    }

    #[tokio::test]
    async fn scan_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.mp4", "a.MP4", "c.mp4", "short.mp4", "broken.mp4", "notes.txt"] {
            fs::write(dir.path().join(name), b"").await.unwrap();
        }
        fs::create_dir(dir.path().join("nested.mp4")).await.unwrap();

        let probe = TableProbe(HashMap::from([
            ("a.MP4".to_string(), 12.0),
            ("b.mp4".to_string(), 30.5),
            ("c.mp4".to_string(), 8.0),
            ("short.mp4".to_string(), 3.5),
            ("notes.txt".to_string(), 100.0),
        ]));

        let pool = scan_source_dir(dir.path(), &probe, 4.0).await.unwrap();
        let names: Vec<&str> = pool.iter().map(|c| c.identifier.as_str()).collect();
        assert_eq!(names, vec!["a.MP4", "b.mp4", "c.mp4"]);
        assert_eq!(pool[1].total_duration, 30.5);
    }

    #[tokio::test]
    async fn scan_missing_dir_errors() {
        let dir = tempfile::tempdir().unwrap();
        let probe = TableProbe(HashMap::new());
        assert!(scan_source_dir(&dir.path().join("nope"), &probe, 4.0).await.is_err());
    }
}
