use once_cell::sync::Lazy;
use std::sync::{Arc, Mutex};

pub mod assembler;
pub mod clip;
pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod init;
pub mod pipeline;
pub mod provider;
pub mod rotation;

pub use assembler::{
    Assembly, AssemblyState, CancellationToken, ClipAssembler, CutSampler, RandomCuts, TrimWriter,
};
pub use clip::{AssemblyManifest, Segment, SourceClip};
pub use config::{AssemblerConfig, PipelineConfig, RetryPolicy};
pub use error::AssemblyError;
pub use rotation::{CursorStore, JsonFileCursorStore, RotationCursor};

pub type LogHook = Arc<Mutex<dyn Fn(&str) + Send + Sync + 'static>>;

static LOG_HOOK: Lazy<Mutex<Option<LogHook>>> = Lazy::new(|| Mutex::new(None));

/// Mirror every pipeline log line into `hook` as well as `tracing`.
pub fn set_log_hook(hook: Option<LogHook>) {
    if let Ok(mut guard) = LOG_HOOK.lock() {
        *guard = hook;
    }
}

pub(crate) fn logv(tag: &str, message: &str) {
    match tag {
        "WARN" => tracing::warn!("{}", message),
        _ => tracing::info!("[{}] {}", tag, message),
    }

    if let Ok(guard) = LOG_HOOK.lock() {
        if let Some(hook) = guard.as_ref() {
            if let Ok(callback) = hook.lock() {
                let line = format!("[{}] {}", tag, message);
                callback(&line);
            }
        }
    }
}

pub(crate) fn logi(message: impl AsRef<str>) {
    logv("INFO", message.as_ref());
}

pub(crate) fn logok(message: impl AsRef<str>) {
    logv("OK", message.as_ref());
}

pub(crate) fn logw(message: impl AsRef<str>) {
    logv("WARN", message.as_ref());
}
