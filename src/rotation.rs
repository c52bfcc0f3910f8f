//! Round-robin selection over an ordered resource list, such as background
//! music tracks, that survives process restarts.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationCursor {
    pub last_index: usize,
}

impl RotationCursor {
    /// Pick the item this cursor points at and return the advanced cursor.
    ///
    /// The index wraps around the list, so a cursor saved against a longer
    /// list stays usable after items are removed.
    pub fn select<'a, T>(&self, items: &'a [T]) -> Option<(&'a T, RotationCursor)> {
        if items.is_empty() {
            return None;
        }
        let chosen = self.last_index % items.len();
        Some((
            &items[chosen],
            RotationCursor {
                last_index: chosen + 1,
            },
        ))
    }
}

#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<RotationCursor>;
    async fn save(&self, key: &str, cursor: RotationCursor) -> Result<()>;
}

/// One `<key>.json` file per cursor under `dir`.
pub struct JsonFileCursorStore {
    dir: PathBuf,
}

impl JsonFileCursorStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl CursorStore for JsonFileCursorStore {
    async fn load(&self, key: &str) -> Result<RotationCursor> {
        let path = self.path_for(key);
        if fs::metadata(&path).await.is_err() {
            return Ok(RotationCursor::default());
        }
        let text = fs::read_to_string(&path)
            .await
            .with_context(|| format!("read cursor: {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parse cursor: {}", path.display()))
    }

    async fn save(&self, key: &str, cursor: RotationCursor) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create dir {}", self.dir.display()))?;
        let path = self.path_for(key);
        let text = serde_json::to_string(&cursor)?;
        fs::write(&path, text)
            .await
            .with_context(|| format!("write cursor: {}", path.display()))?;
        Ok(())
    }
}
