use crate::assembler::{CancellationToken, ClipAssembler, RandomCuts, TrimWriter};
use crate::clip::{AssemblyManifest, Segment};
use crate::config::PipelineConfig;
use crate::ffmpeg::FfmpegTrimmer;
use crate::init;
use crate::provider::{self, DurationProbe, FfprobeDuration};
use crate::rotation::{CursorStore, JsonFileCursorStore, RotationCursor};
use crate::{logi, logok, logw};
use anyhow::{Context, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use walkdir::WalkDir;

const MUSIC_CURSOR_KEY: &str = "music";
const MUSIC_EXTENSIONS: &[&str] = &["mp3", "m4a", "wav"];
const CAPTION_CURSOR_KEY: &str = "captions";
const CAPTION_EXTENSIONS: &[&str] = &["txt", "srt"];

fn now_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

async fn dir_exists(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create dir {}", parent.display()))?;
        }
    }
    Ok(())
}

async fn clear_directory_contents(dir_path: &Path) -> Result<()> {
    if !dir_exists(dir_path).await {
        return Ok(());
    }

    for entry in WalkDir::new(dir_path).min_depth(1).contents_first(true) {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type().is_dir() {
            fs::remove_dir(path)
                .await
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        } else {
            fs::remove_file(path)
                .await
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        }
    }

    Ok(())
}

async fn list_files_with_ext(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    if !dir_exists(dir).await {
        return Ok(out);
    }

    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if let Some(ext) = path.extension().and_then(OsStr::to_str) {
            let ext_lower = ext.to_ascii_lowercase();
            if extensions.contains(&ext_lower.as_str()) {
                out.push(path);
            }
        }
    }
    out.sort();
    Ok(out)
}

/// A rotating pick whose advanced cursor has not been persisted yet.
struct Pick {
    key: &'static str,
    item: PathBuf,
    next: RotationCursor,
}

async fn pick_rotating<S: CursorStore + ?Sized>(
    dir: &Path,
    key: &'static str,
    extensions: &[&str],
    store: &S,
) -> Result<Option<Pick>> {
    let items = list_files_with_ext(dir, extensions).await?;
    let cursor = store.load(key).await?;
    let Some((item, next)) = cursor.select(&items) else {
        logw(format!("No {} files in {}; manifest has none", key, dir.display()));
        return Ok(None);
    };
    logi(format!("Picked {} file: {}", key, item.display()));
    Ok(Some(Pick {
        key,
        item: item.clone(),
        next,
    }))
}

async fn commit_picks<S: CursorStore + ?Sized>(store: &S, picks: &[&Option<Pick>]) -> Result<()> {
    for pick in picks.iter().copied().flatten() {
        store.save(pick.key, pick.next).await?;
    }
    Ok(())
}

/// Render the ffmpeg concat-demuxer list for `segments`.
///
/// Paths are made relative to `list_dir` when possible, since the demuxer
/// resolves relative entries against the list file's own location.
pub fn concat_list(segments: &[Segment], list_dir: &Path) -> String {
    let mut out = String::new();
    for seg in segments {
        let entry = pathdiff::diff_paths(&seg.artifact_path, list_dir)
            .unwrap_or_else(|| seg.artifact_path.clone());
        let escaped = entry.display().to_string().replace('\'', "'\\''");
        out.push_str(&format!("file '{}'\n", escaped));
    }
    out
}

async fn write_outputs(cfg: &PipelineConfig, manifest: &AssemblyManifest) -> Result<()> {
    ensure_parent(&cfg.manifest_path).await?;
    fs::write(&cfg.manifest_path, manifest.to_json()?)
        .await
        .with_context(|| format!("write manifest: {}", cfg.manifest_path.display()))?;

    ensure_parent(&cfg.concat_list_path).await?;
    let list_dir = cfg
        .concat_list_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let mut listf = fs::File::create(&cfg.concat_list_path)
        .await
        .with_context(|| format!("create concat list: {}", cfg.concat_list_path.display()))?;
    listf
        .write_all(concat_list(&manifest.segments, &list_dir).as_bytes())
        .await?;
    listf.flush().await?;
    Ok(())
}

/// Run one assembly with the given probe and writer.
///
/// The assembler runs on a blocking worker since each cut is a synchronous
/// encoder call.
pub async fn run_assembly_with<P, W>(
    cfg: &PipelineConfig,
    probe: &P,
    writer: W,
    cancel: CancellationToken,
) -> Result<AssemblyManifest>
where
    P: DurationProbe + ?Sized,
    W: TrimWriter + Send + 'static,
{
    cfg.check_output_isolated()?;
    init::ensure_directories(cfg).await?;

    logi(format!("Clearing {} ...", cfg.output_dir.display()));
    clear_directory_contents(&cfg.output_dir).await?;

    let pool =
        provider::scan_source_dir(&cfg.source_dir, probe, cfg.assembler.start_margin).await?;

    let assembler = ClipAssembler::new(cfg.assembler.clone())?.with_cancellation(cancel);
    let seed = cfg.seed.unwrap_or_else(now_seed);
    logi(format!("Assembling from {} clips (seed {})", pool.len(), seed));

    let assembly = tokio::task::spawn_blocking(move || {
        let mut writer = writer;
        let mut cuts = RandomCuts(StdRng::seed_from_u64(seed));
        assembler.assemble(&pool, &mut cuts, &mut writer)
    })
    .await
    .context("Assembly worker failed")??;

    let store = JsonFileCursorStore::new(&cfg.state_dir);
    let music = pick_rotating(&cfg.music_dir, MUSIC_CURSOR_KEY, MUSIC_EXTENSIONS, &store).await?;
    let caption =
        pick_rotating(&cfg.caption_dir, CAPTION_CURSOR_KEY, CAPTION_EXTENSIONS, &store).await?;

    let manifest = AssemblyManifest {
        segments: assembly.segments,
        accumulated_duration: assembly.accumulated_duration,
        passes: assembly.passes,
        music_track: music.as_ref().map(|p| p.item.clone()),
        caption_file: caption.as_ref().map(|p| p.item.clone()),
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    write_outputs(cfg, &manifest).await?;
    // Cursors only advance for a run that produced its outputs.
    commit_picks(&store, &[&music, &caption]).await?;

    logok(format!(
        "Wrote manifest {} ({} segments, {:.2}s)",
        cfg.manifest_path.display(),
        manifest.segments.len(),
        manifest.accumulated_duration
    ));
    Ok(manifest)
}

pub async fn run_assembly(cfg: &PipelineConfig, cancel: CancellationToken) -> Result<AssemblyManifest> {
    let writer = FfmpegTrimmer::new(&cfg.source_dir, &cfg.output_dir);
    run_assembly_with(cfg, &FfprobeDuration, writer, cancel).await
}
