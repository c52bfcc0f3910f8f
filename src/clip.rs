use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One candidate input clip handed to the assembler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceClip {
    pub identifier: String,
    pub total_duration: f64,
}

impl SourceClip {
    pub fn new(identifier: impl Into<String>, total_duration: f64) -> Self {
        Self {
            identifier: identifier.into(),
            total_duration,
        }
    }
}

/// A trimmed contiguous sub-range of a source clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub source_identifier: String,
    pub start_offset: f64,
    pub end_offset: f64,
    pub duration: f64,
    pub artifact_path: PathBuf,
}

impl Segment {
    pub fn new(
        source_identifier: impl Into<String>,
        start_offset: f64,
        end_offset: f64,
        artifact_path: PathBuf,
    ) -> Self {
        Self {
            source_identifier: source_identifier.into(),
            start_offset,
            end_offset,
            duration: end_offset - start_offset,
            artifact_path,
        }
    }
}

/// What the output step receives once assembly finishes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssemblyManifest {
    pub segments: Vec<Segment>,
    pub accumulated_duration: f64,
    pub passes: u32,
    #[serde(default)]
    pub music_track: Option<PathBuf>,
    #[serde(default)]
    pub caption_file: Option<PathBuf>,
    pub created_at: String,
}

impl AssemblyManifest {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).with_context(|| "Failed to parse assembly manifest JSON")
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).with_context(|| "Failed to serialize assembly manifest")
    }
}
