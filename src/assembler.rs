//! Bounded-duration clip assembly.
//!
//! The assembler scans a pool of source clips in order, cutting one random
//! sub-range from each until the running total reaches the configured
//! minimum. If the final cut pushes the total past the maximum, the last
//! segment is shortened and written again.

use crate::clip::{Segment, SourceClip};
use crate::config::AssemblerConfig;
use crate::error::{AssemblyError, Result};
use crate::{logi, logok, logw};
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Cuts `[start, end)` out of `source` and returns where the result landed.
///
/// Must be idempotent under identical arguments: overshoot correction calls
/// it a second time for the last segment with a shorter range.
pub trait TrimWriter {
    fn trim(&mut self, source: &SourceClip, start: f64, end: f64) -> anyhow::Result<PathBuf>;

    /// Drop an artifact that no segment refers to any more.
    fn discard(&mut self, _artifact: &Path) -> anyhow::Result<()> {
        Ok(())
    }
}

impl<W: TrimWriter + ?Sized> TrimWriter for &mut W {
    fn trim(&mut self, source: &SourceClip, start: f64, end: f64) -> anyhow::Result<PathBuf> {
        (**self).trim(source, start, end)
    }

    fn discard(&mut self, artifact: &Path) -> anyhow::Result<()> {
        (**self).discard(artifact)
    }
}

/// Source of the two random draws made per segment.
pub trait CutSampler {
    /// A start offset in `[0, latest_start]`.
    fn start_offset(&mut self, latest_start: f64) -> f64;

    /// A span in `[min_span, available]`. Only called when `min_span <= available`.
    fn span(&mut self, min_span: f64, available: f64) -> f64;
}

/// Uniform draws from any `rand` generator.
pub struct RandomCuts<R>(pub R);

impl<R: Rng> CutSampler for RandomCuts<R> {
    fn start_offset(&mut self, latest_start: f64) -> f64 {
        if latest_start <= 0.0 {
            return 0.0;
        }
        self.0.gen_range(0.0..=latest_start)
    }

    fn span(&mut self, min_span: f64, available: f64) -> f64 {
        self.0.gen_range(min_span..=available)
    }
}

/// Shared flag checked at the top of every pool scan.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// In-progress segment list for a single run.
#[derive(Debug, Clone, Default)]
pub struct AssemblyState {
    segments: Vec<Segment>,
    accumulated: f64,
}

impl AssemblyState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, segment: Segment) {
        self.accumulated += segment.duration;
        self.segments.push(segment);
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn accumulated(&self) -> f64 {
        self.accumulated
    }

    /// Shorten the last segment so the total equals `max_total`.
    ///
    /// `source` must be the clip the last segment was cut from. A no-op when
    /// the total is already within bounds.
    pub fn correct_overshoot<W: TrimWriter + ?Sized>(
        &mut self,
        source: &SourceClip,
        max_total: f64,
        writer: &mut W,
    ) -> Result<()> {
        if self.accumulated <= max_total {
            return Ok(());
        }
        let excess = self.accumulated - max_total;
        let Some(last) = self.segments.last_mut() else {
            return Ok(());
        };

        let duration = last.duration - excess;
        if duration <= 0.0 {
            return Err(AssemblyError::DegenerateSegment {
                source_identifier: last.source_identifier.clone(),
                duration,
                excess,
            });
        }

        let end = last.start_offset + duration;
        let path = writer
            .trim(source, last.start_offset, end)
            .map_err(|e| AssemblyError::segment_write(&source.identifier, e))?;

        logi(format!(
            "Total {:.2}s exceeds {:.2}s; trimmed {} by {:.2}s to {:.2}s",
            self.accumulated, max_total, last.source_identifier, excess, duration
        ));

        let stale = std::mem::replace(&mut last.artifact_path, path);
        last.end_offset = end;
        last.duration = end - last.start_offset;
        self.accumulated = max_total;

        if stale != last.artifact_path {
            writer
                .discard(&stale)
                .map_err(|e| AssemblyError::segment_write(&source.identifier, e))?;
        }
        Ok(())
    }
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub segments: Vec<Segment>,
    pub accumulated_duration: f64,
    pub passes: u32,
}

pub struct ClipAssembler {
    config: AssemblerConfig,
    cancel: Option<CancellationToken>,
}

impl ClipAssembler {
    pub fn new(config: AssemblerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: None,
        })
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    pub fn assemble<S, W>(
        &self,
        pool: &[SourceClip],
        sampler: &mut S,
        writer: &mut W,
    ) -> Result<Assembly>
    where
        S: CutSampler + ?Sized,
        W: TrimWriter + ?Sized,
    {
        let cfg = &self.config;
        if pool.len() < cfg.minimum_source_pool_size {
            return Err(AssemblyError::InsufficientPool {
                available: pool.len(),
                required: cfg.minimum_source_pool_size,
            });
        }
        for clip in pool {
            if !clip.total_duration.is_finite() || clip.total_duration <= cfg.start_margin {
                return Err(AssemblyError::ClipTooShort {
                    identifier: clip.identifier.clone(),
                    total_duration: clip.total_duration,
                    start_margin: cfg.start_margin,
                });
            }
        }

        let started = Instant::now();
        let deadline = cfg.retry.deadline();
        let mut state = AssemblyState::new();
        let mut last_source: Option<&SourceClip> = None;
        let mut passes = 0u32;

        while state.accumulated() < cfg.min_total_duration {
            if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
                return Err(AssemblyError::Cancelled { passes });
            }
            let out_of_passes = cfg.retry.max_passes.is_some_and(|max| passes >= max);
            let out_of_time = deadline.is_some_and(|d| started.elapsed() >= d);
            if out_of_passes || out_of_time {
                return Err(AssemblyError::AssemblyTimeout {
                    passes,
                    accumulated: state.accumulated(),
                });
            }
            passes += 1;

            for clip in pool {
                let segment = self.cut_segment(clip, sampler, writer)?;
                state.push(segment);
                last_source = Some(clip);
                logi(format!(
                    "Cut {} ({:.2}s), total {:.2}s",
                    clip.identifier,
                    state.segments().last().map(|s| s.duration).unwrap_or_default(),
                    state.accumulated()
                ));
                if state.accumulated() >= cfg.min_total_duration {
                    break;
                }
            }

            if state.accumulated() < cfg.min_total_duration {
                logw(format!(
                    "Total duration {:.2}s is less than {:.2}s after pass {}; scanning the pool again",
                    state.accumulated(),
                    cfg.min_total_duration,
                    passes
                ));
            }
        }

        if let Some(source) = last_source {
            state.correct_overshoot(source, cfg.max_total_duration, writer)?;
        }

        logok(format!(
            "Assembled {} segments, {:.2}s in {} passes",
            state.segments().len(),
            state.accumulated(),
            passes
        ));

        let accumulated_duration = state.accumulated();
        Ok(Assembly {
            segments: state.segments,
            accumulated_duration,
            passes,
        })
    }

    fn cut_segment<S, W>(&self, clip: &SourceClip, sampler: &mut S, writer: &mut W) -> Result<Segment>
    where
        S: CutSampler + ?Sized,
        W: TrimWriter + ?Sized,
    {
        let cfg = &self.config;
        let latest_start = clip.total_duration - cfg.start_margin;
        let start = sampler.start_offset(latest_start).clamp(0.0, latest_start);

        let available = cfg.max_segment_span.min(clip.total_duration - start);
        let span = if available < cfg.min_segment_span {
            available
        } else {
            sampler
                .span(cfg.min_segment_span, available)
                .clamp(cfg.min_segment_span, available)
        };
        let end = (start + span).min(clip.total_duration);

        let path = writer
            .trim(clip, start, end)
            .map_err(|e| AssemblyError::segment_write(&clip.identifier, e))?;
        Ok(Segment::new(&clip.identifier, start, end, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    struct NullWriter;

    impl TrimWriter for NullWriter {
        fn trim(&mut self, source: &SourceClip, start: f64, end: f64) -> anyhow::Result<PathBuf> {
            Ok(PathBuf::from(format!("{}_{start:.3}_{end:.3}", source.identifier)))
        }
    }

    fn pool(count: usize, duration: f64) -> Vec<SourceClip> {
        (0..count)
            .map(|i| SourceClip::new(format!("clip{i:02}.mp4"), duration))
            .collect()
    }

    #[test]
    fn random_cuts_stay_in_range() {
        let mut cuts = RandomCuts(StdRng::seed_from_u64(1));
        for _ in 0..200 {
            let start = cuts.start_offset(16.0);
            assert!((0.0..=16.0).contains(&start));
            let span = cuts.span(3.0, 6.0);
            assert!((3.0..=6.0).contains(&span));
        }
        assert_eq!(cuts.start_offset(0.0), 0.0);
    }

    #[test]
    fn token_is_shared_between_clones() {
        let token = CancellationToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn new_rejects_invalid_config() {
        let cfg = AssemblerConfig {
            max_segment_span: 2.0,
            ..AssemblerConfig::default()
        };
        assert!(matches!(
            ClipAssembler::new(cfg),
            Err(AssemblyError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn short_clip_gets_degenerate_span() {
        // Starts land in [0, 1], so at most 5s remain against a 5s min span.
        let cfg = AssemblerConfig {
            min_segment_span: 5.0,
            max_segment_span: 6.0,
            minimum_source_pool_size: 1,
            min_total_duration: 1.0,
            max_total_duration: 10.0,
            ..AssemblerConfig::default()
        };
        let assembler = ClipAssembler::new(cfg).unwrap();
        let mut cuts = RandomCuts(StdRng::seed_from_u64(3));
        let result = assembler
            .assemble(&pool(1, 5.0), &mut cuts, &mut NullWriter)
            .unwrap();

        let seg = &result.segments[0];
        assert!((0.0..=1.0).contains(&seg.start_offset));
        assert!((seg.end_offset - 5.0).abs() < 1e-9);
        assert!(seg.duration >= 4.0 - 1e-9);
    }

    #[derive(Default)]
    struct DiscardLog(Vec<PathBuf>);

    impl TrimWriter for DiscardLog {
        fn trim(&mut self, source: &SourceClip, start: f64, end: f64) -> anyhow::Result<PathBuf> {
            NullWriter.trim(source, start, end)
        }

        fn discard(&mut self, artifact: &Path) -> anyhow::Result<()> {
            self.0.push(artifact.to_path_buf());
            Ok(())
        }
    }

    #[test]
    fn correct_overshoot_discards_replaced_artifact() {
        let mut state = AssemblyState::new();
        state.push(Segment::new("a.mp4", 0.0, 55.0, PathBuf::from("a")));
        state.push(Segment::new("b.mp4", 2.0, 8.0, PathBuf::from("b_full")));
        let source = SourceClip::new("b.mp4", 20.0);

        let mut writer = DiscardLog::default();
        state.correct_overshoot(&source, 59.0, &mut writer).unwrap();

        assert_eq!(writer.0, vec![PathBuf::from("b_full")]);
        assert_eq!(
            state.segments()[1].artifact_path,
            PathBuf::from("b.mp4_2.000_6.000")
        );
    }

    #[test]
    fn correct_overshoot_keeps_artifact_rewritten_in_place() {
        struct InPlace(DiscardLog);

        impl TrimWriter for InPlace {
            fn trim(&mut self, _: &SourceClip, _: f64, _: f64) -> anyhow::Result<PathBuf> {
                Ok(PathBuf::from("same.mp4"))
            }

            fn discard(&mut self, artifact: &Path) -> anyhow::Result<()> {
                self.0.discard(artifact)
            }
        }

        let mut state = AssemblyState::new();
        state.push(Segment::new("a.mp4", 0.0, 60.0, PathBuf::from("same.mp4")));
        let source = SourceClip::new("a.mp4", 90.0);
        let mut writer = InPlace(DiscardLog::default());
        state.correct_overshoot(&source, 59.0, &mut writer).unwrap();
        assert!(writer.0.0.is_empty());
    }

    #[test]
    fn correct_overshoot_is_noop_within_bounds() {
        let mut state = AssemblyState::new();
        state.push(Segment::new("a.mp4", 0.0, 5.0, PathBuf::from("a")));
        let source = SourceClip::new("a.mp4", 20.0);
        state.correct_overshoot(&source, 59.0, &mut NullWriter).unwrap();
        assert_eq!(state.accumulated(), 5.0);
        assert_eq!(state.segments()[0].artifact_path, PathBuf::from("a"));
    }

    #[test]
    fn correct_overshoot_rejects_degenerate_cut() {
        let mut state = AssemblyState::new();
        state.push(Segment::new("a.mp4", 0.0, 30.0, PathBuf::from("a")));
        state.push(Segment::new("b.mp4", 0.0, 30.0, PathBuf::from("b")));
        state.push(Segment::new("c.mp4", 1.0, 3.0, PathBuf::from("c")));
        let source = SourceClip::new("c.mp4", 20.0);

        let err = state
            .correct_overshoot(&source, 59.0, &mut NullWriter)
            .unwrap_err();
        match err {
            AssemblyError::DegenerateSegment {
                source_identifier,
                duration,
                excess,
            } => {
                assert_eq!(source_identifier, "c.mp4");
                assert!((excess - 3.0).abs() < 1e-9);
                assert!((duration + 1.0).abs() < 1e-9);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn correct_overshoot_rejects_exact_zero() {
        let mut state = AssemblyState::new();
        state.push(Segment::new("a.mp4", 0.0, 57.0, PathBuf::from("a")));
        state.push(Segment::new("b.mp4", 2.0, 6.0, PathBuf::from("b")));
        let source = SourceClip::new("b.mp4", 20.0);
        let result = state.correct_overshoot(&source, 57.0, &mut NullWriter);
        assert!(matches!(result, Err(AssemblyError::DegenerateSegment { .. })));
    }
}
