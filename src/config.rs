use crate::error::AssemblyError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// Bounds on how long the assembler keeps rescanning a short pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_passes")]
    pub max_passes: Option<u32>,
    #[serde(default)]
    pub max_elapsed_secs: Option<f64>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_passes: default_max_passes(),
            max_elapsed_secs: None,
        }
    }
}

impl RetryPolicy {
    pub fn deadline(&self) -> Option<Duration> {
        self.max_elapsed_secs.map(Duration::from_secs_f64)
    }
}

fn default_max_passes() -> Option<u32> {
    Some(20)
}

/// Tunables for one assembly run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblerConfig {
    #[serde(default = "default_min_total")]
    pub min_total_duration: f64,
    #[serde(default = "default_max_total")]
    pub max_total_duration: f64,
    #[serde(default = "default_min_span")]
    pub min_segment_span: f64,
    #[serde(default = "default_max_span")]
    pub max_segment_span: f64,
    #[serde(default = "default_min_pool")]
    pub minimum_source_pool_size: usize,
    /// Room kept between a random start point and the end of its clip.
    #[serde(default = "default_start_margin")]
    pub start_margin: f64,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_min_total() -> f64 {
    55.0
}

fn default_max_total() -> f64 {
    59.0
}

fn default_min_span() -> f64 {
    3.0
}

fn default_max_span() -> f64 {
    6.0
}

fn default_min_pool() -> usize {
    10
}

fn default_start_margin() -> f64 {
    4.0
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            min_total_duration: default_min_total(),
            max_total_duration: default_max_total(),
            min_segment_span: default_min_span(),
            max_segment_span: default_max_span(),
            minimum_source_pool_size: default_min_pool(),
            start_margin: default_start_margin(),
            retry: RetryPolicy::default(),
        }
    }
}

impl AssemblerConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        let positive = [
            ("min_total_duration", self.min_total_duration),
            ("max_total_duration", self.max_total_duration),
            ("min_segment_span", self.min_segment_span),
            ("max_segment_span", self.max_segment_span),
            ("start_margin", self.start_margin),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(AssemblyError::invalid_config(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }

        if self.min_segment_span > self.max_segment_span {
            return Err(AssemblyError::invalid_config(format!(
                "min_segment_span {} exceeds max_segment_span {}",
                self.min_segment_span, self.max_segment_span
            )));
        }
        if self.min_total_duration > self.max_total_duration {
            return Err(AssemblyError::invalid_config(format!(
                "min_total_duration {} exceeds max_total_duration {}",
                self.min_total_duration, self.max_total_duration
            )));
        }
        if self.minimum_source_pool_size == 0 {
            return Err(AssemblyError::invalid_config(
                "minimum_source_pool_size must be at least 1",
            ));
        }

        match (self.retry.max_passes, self.retry.max_elapsed_secs) {
            (None, None) => {
                return Err(AssemblyError::invalid_config(
                    "retry policy needs max_passes or max_elapsed_secs",
                ));
            }
            (Some(0), _) => {
                return Err(AssemblyError::invalid_config("max_passes must be at least 1"));
            }
            (_, Some(secs)) if !secs.is_finite() || secs <= 0.0 => {
                return Err(AssemblyError::invalid_config(format!(
                    "max_elapsed_secs must be positive, got {secs}"
                )));
            }
            _ => {}
        }

        Ok(())
    }
}

/// Everything the pipeline runner reads from `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_music_dir")]
    pub music_dir: PathBuf,
    #[serde(default = "default_caption_dir")]
    pub caption_dir: PathBuf,
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default = "default_manifest_path")]
    pub manifest_path: PathBuf,
    #[serde(default = "default_concat_list_path")]
    pub concat_list_path: PathBuf,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub assembler: AssemblerConfig,
}

fn default_source_dir() -> PathBuf {
    PathBuf::from("footages")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("cut_videos")
}

fn default_music_dir() -> PathBuf {
    PathBuf::from("music")
}

fn default_caption_dir() -> PathBuf {
    PathBuf::from("captions")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("state")
}

fn default_manifest_path() -> PathBuf {
    PathBuf::from("cut_videos/manifest.json")
}

fn default_concat_list_path() -> PathBuf {
    PathBuf::from("cut_videos/concat_list.txt")
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            output_dir: default_output_dir(),
            music_dir: default_music_dir(),
            caption_dir: default_caption_dir(),
            state_dir: default_state_dir(),
            manifest_path: default_manifest_path(),
            concat_list_path: default_concat_list_path(),
            seed: None,
            assembler: AssemblerConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
        let config: PipelineConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.as_ref().display()))?;

        if config.source_dir.as_os_str().is_empty() {
            anyhow::bail!("config.json: source_dir missing");
        }
        if config.output_dir.as_os_str().is_empty() {
            anyhow::bail!("config.json: output_dir missing");
        }
        config.check_output_isolated()?;
        config.assembler.validate()?;

        Ok(config)
    }

    /// The output dir is wiped before every run, so it must not share files
    /// with the source footage.
    pub fn check_output_isolated(&self) -> Result<()> {
        if dirs_overlap(&self.source_dir, &self.output_dir) {
            anyhow::bail!(
                "config.json: output_dir {} overlaps source_dir {}",
                self.output_dir.display(),
                self.source_dir.display()
            );
        }
        Ok(())
    }
}

/// Canonicalize the longest existing prefix of `path` and re-append the rest,
/// so directories that do not exist yet compare like their real parents.
fn resolve_dir(path: &Path) -> PathBuf {
    let abs = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut existing = abs.as_path();
    let mut rest = Vec::new();
    loop {
        if let Ok(mut out) = existing.canonicalize() {
            for part in rest.iter().rev() {
                out.push(part);
            }
            return out;
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                rest.push(name.to_os_string());
                existing = parent;
            }
            _ => break,
        }
    }
    abs
}

/// True when `a` and `b` are the same directory or one contains the other.
pub fn dirs_overlap(a: &Path, b: &Path) -> bool {
    let a = resolve_dir(a);
    let b = resolve_dir(b);
    a.starts_with(&b) || b.starts_with(&a)
}
