//! Weighted progress projection.
//!
//! Each stage owns a disjoint percentage band of the overall value. Within a
//! stage, `overall = band_start + (band_end - band_start) * sub / 100`. The
//! video-upload band and the compile band overlap in wall-clock time but hold
//! disjoint bands; the overall value is driven by whichever report projects
//! furthest and is clamped monotonically non-decreasing. The video upload's
//! own fraction is additionally surfaced as `video_percent` so the longer
//! transfer never stalls the displayed milestone.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use crate::events::{EventSink, PipelineEvent};

/// Stages of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineStage {
    Idle,
    NormalizingVideo,
    CreatingRecord,
    UploadingImage,
    UploadingVideo,
    CompilingMarker,
    UploadingMarker,
    Completed,
}

impl PipelineStage {
    /// The `(start, end)` percentage band this stage owns.
    pub fn band(&self) -> (f32, f32) {
        match self {
            PipelineStage::Idle => (0.0, 0.0),
            PipelineStage::NormalizingVideo => (0.0, 5.0),
            PipelineStage::CreatingRecord => (5.0, 12.0),
            PipelineStage::UploadingImage => (12.0, 25.0),
            PipelineStage::UploadingVideo => (25.0, 60.0),
            PipelineStage::CompilingMarker => (60.0, 95.0),
            PipelineStage::UploadingMarker => (95.0, 99.0),
            PipelineStage::Completed => (100.0, 100.0),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Idle => "idle",
            PipelineStage::NormalizingVideo => "normalizing_video",
            PipelineStage::CreatingRecord => "creating_record",
            PipelineStage::UploadingImage => "uploading_image",
            PipelineStage::UploadingVideo => "uploading_video",
            PipelineStage::CompilingMarker => "compiling_marker",
            PipelineStage::UploadingMarker => "uploading_marker",
            PipelineStage::Completed => "completed",
        }
    }
}

impl Display for PipelineStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

/// One observation of a run's progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    pub stage: PipelineStage,
    /// Monotonically non-decreasing, 0..=100. Reaches 100 exactly once, at
    /// completion.
    pub overall: f32,
    /// Fraction of the video transfer, independent of `overall`.
    pub video_percent: f32,
}

impl ProgressSnapshot {
    fn initial() -> Self {
        Self {
            stage: PipelineStage::Idle,
            overall: 0.0,
            video_percent: 0.0,
        }
    }
}

struct TrackerState {
    snapshot: ProgressSnapshot,
    completed: bool,
}

/// Aggregates per-stage sub-progress into the projected overall value.
///
/// Safe to share across forked branches; every mutation is clamped so any
/// interleaving of branch reports yields a non-decreasing overall. The watch
/// channel and the optional event sink are both fed under the state lock, so
/// every observer sees a monotonic sequence; sinks must not block.
pub struct ProgressTracker {
    state: Mutex<TrackerState>,
    tx: watch::Sender<ProgressSnapshot>,
    sink: Option<Arc<dyn EventSink>>,
}

impl ProgressTracker {
    pub fn new() -> (Arc<Self>, watch::Receiver<ProgressSnapshot>) {
        Self::build(None)
    }

    /// A tracker that mirrors every observation to an event sink.
    pub fn with_sink(sink: Arc<dyn EventSink>) -> (Arc<Self>, watch::Receiver<ProgressSnapshot>) {
        Self::build(Some(sink))
    }

    fn build(
        sink: Option<Arc<dyn EventSink>>,
    ) -> (Arc<Self>, watch::Receiver<ProgressSnapshot>) {
        let (tx, rx) = watch::channel(ProgressSnapshot::initial());
        (
            Arc::new(Self {
                state: Mutex::new(TrackerState {
                    snapshot: ProgressSnapshot::initial(),
                    completed: false,
                }),
                tx,
                sink,
            }),
            rx,
        )
    }

    /// Record that a stage has begun; overall advances to the band start.
    pub fn enter_stage(&self, stage: PipelineStage) -> ProgressSnapshot {
        self.update(stage, 0.0, true)
    }

    /// Record fractional progress (0..=100) within a stage.
    pub fn stage_progress(&self, stage: PipelineStage, sub_percent: f32) -> ProgressSnapshot {
        self.update(stage, sub_percent.clamp(0.0, 100.0), false)
    }

    /// Terminal transition: overall reaches 100, exactly once.
    pub fn complete(&self) -> Option<ProgressSnapshot> {
        let mut state = self.state.lock().unwrap();
        if state.completed {
            return None;
        }
        state.completed = true;
        state.snapshot.stage = PipelineStage::Completed;
        state.snapshot.overall = 100.0;
        let snapshot = state.snapshot;
        let _ = self.tx.send(snapshot);
        if let Some(sink) = &self.sink {
            sink.emit(&PipelineEvent::Progress { snapshot });
        }
        Some(snapshot)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.state.lock().unwrap().snapshot
    }

    fn update(&self, stage: PipelineStage, sub_percent: f32, entering: bool) -> ProgressSnapshot {
        let (start, end) = stage.band();
        let projected = start + (end - start) * sub_percent / 100.0;

        let mut state = self.state.lock().unwrap();
        if state.completed {
            return state.snapshot;
        }
        if stage == PipelineStage::UploadingVideo {
            state.snapshot.video_percent = state.snapshot.video_percent.max(sub_percent);
        }
        if stage > state.snapshot.stage {
            state.snapshot.stage = stage;
        }
        state.snapshot.overall = state.snapshot.overall.max(projected.min(99.0));
        let snapshot = state.snapshot;
        let _ = self.tx.send(snapshot);
        if let Some(sink) = &self.sink {
            if entering {
                sink.emit(&PipelineEvent::StageEntered { snapshot });
            } else {
                sink.emit(&PipelineEvent::Progress { snapshot });
            }
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_projection() {
        let (tracker, _rx) = ProgressTracker::new();
        tracker.enter_stage(PipelineStage::NormalizingVideo);
        let s = tracker.stage_progress(PipelineStage::NormalizingVideo, 50.0);
        assert!((s.overall - 2.5).abs() < f32::EPSILON);

        let s = tracker.stage_progress(PipelineStage::CreatingRecord, 100.0);
        assert!((s.overall - 12.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_overall_is_monotonic_under_interleaving() {
        let (tracker, _rx) = ProgressTracker::new();
        let reports = [
            (PipelineStage::UploadingImage, 40.0),
            (PipelineStage::UploadingVideo, 10.0),
            (PipelineStage::UploadingImage, 100.0),
            (PipelineStage::UploadingVideo, 5.0),
            (PipelineStage::CompilingMarker, 20.0),
            (PipelineStage::UploadingVideo, 60.0),
            (PipelineStage::CompilingMarker, 80.0),
            (PipelineStage::UploadingVideo, 30.0),
            (PipelineStage::UploadingMarker, 100.0),
        ];
        let mut last = 0.0f32;
        for (stage, sub) in reports {
            let s = tracker.stage_progress(stage, sub);
            assert!(
                s.overall >= last,
                "overall regressed: {} -> {}",
                last,
                s.overall
            );
            last = s.overall;
        }
        // Marker upload caps below 100; only completion reaches it.
        assert!(last <= 99.0);
    }

    #[test]
    fn test_video_fraction_is_surfaced_separately() {
        let (tracker, _rx) = ProgressTracker::new();
        tracker.stage_progress(PipelineStage::CompilingMarker, 90.0);
        let s = tracker.stage_progress(PipelineStage::UploadingVideo, 40.0);
        // Video fraction visible even though a later band drives overall.
        assert!((s.video_percent - 40.0).abs() < f32::EPSILON);
        assert!(s.overall >= 60.0 + 35.0 * 0.9 - f32::EPSILON);
        assert_eq!(s.stage, PipelineStage::CompilingMarker);
    }

    #[test]
    fn test_complete_reaches_100_exactly_once() {
        let (tracker, rx) = ProgressTracker::new();
        tracker.stage_progress(PipelineStage::UploadingMarker, 100.0);
        assert!(tracker.complete().is_some());
        assert!(tracker.complete().is_none());
        assert_eq!(rx.borrow().overall, 100.0);
        assert_eq!(rx.borrow().stage, PipelineStage::Completed);

        // Late reports after completion do not move anything.
        let s = tracker.stage_progress(PipelineStage::UploadingVideo, 50.0);
        assert_eq!(s.overall, 100.0);
    }
}
