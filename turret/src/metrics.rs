//! Performance and tracking-quality accounting for a session.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;
use shared::detection::{BoundingBox, Detection};

use crate::config::MetricsConfig;

/// Samples kept raw before FPS smoothing starts
const FPS_WINDOW: usize = 10;

/// Accumulates per-frame detection and tracking statistics.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    config: MetricsConfig,
    start: Option<Instant>,
    frames_evaluated: u64,
    detection_times: Vec<Duration>,
    fps: Vec<f64>,
    detection_accuracy: Vec<f64>,
    total_frames: u64,
    successful_tracks: u64,
    target_losses: u64,
    tracking_offsets: Vec<f64>,
}

impl MetricsCollector {
    pub fn new(config: MetricsConfig) -> Self {
        Self {
            config,
            start: None,
            frames_evaluated: 0,
            detection_times: Vec::new(),
            fps: Vec::new(),
            detection_accuracy: Vec::new(),
            total_frames: 0,
            successful_tracks: 0,
            target_losses: 0,
            tracking_offsets: Vec::new(),
        }
    }

    /// Begin timing. FPS is only recorded once timing has started.
    pub fn start_evaluation(&mut self) {
        self.start_evaluation_at(Instant::now());
    }

    pub fn start_evaluation_at(&mut self, now: Instant) {
        self.start = Some(now);
    }

    /// Record one detector run.
    ///
    /// `ground_truth`, when available, is compared with the detection's box
    /// (a detection without a box scores as an empty box).
    pub fn record_detection(
        &mut self,
        elapsed: Duration,
        detection: Option<&Detection>,
        ground_truth: Option<&BoundingBox>,
    ) {
        self.record_detection_at(elapsed, detection, ground_truth, Instant::now());
    }

    pub fn record_detection_at(
        &mut self,
        elapsed: Duration,
        detection: Option<&Detection>,
        ground_truth: Option<&BoundingBox>,
        now: Instant,
    ) {
        self.detection_times.push(elapsed);
        self.frames_evaluated += 1;

        if let Some(start) = self.start {
            let running = now.saturating_duration_since(start).as_secs_f64();
            if running > 0.0 {
                let fps = self.frames_evaluated as f64 / running;
                let sample = if self.fps.len() < FPS_WINDOW {
                    fps
                } else {
                    let recent = &self.fps[self.fps.len() - (FPS_WINDOW - 1)..];
                    (recent.iter().sum::<f64>() + fps) / FPS_WINDOW as f64
                };
                self.fps.push(sample);
            }
        }

        if let (Some(detection), Some(truth)) = (detection, ground_truth) {
            let predicted = detection.bbox.unwrap_or_else(BoundingBox::empty);
            self.detection_accuracy.push(predicted.iou(truth));
        }
    }

    /// Record whether the target was held this frame.
    pub fn record_tracking(&mut self, detection: Option<&Detection>) {
        self.total_frames += 1;
        let Some(detection) = detection else {
            self.target_losses += 1;
            return;
        };

        let (sx, sy) = self.config.offset_scale;
        let distance = (detection.x_offset * sx).hypot(detection.y_offset * sy);
        self.tracking_offsets.push(distance);
        if distance > self.config.loss_threshold {
            self.target_losses += 1;
        } else {
            self.successful_tracks += 1;
        }
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn frames_evaluated(&self) -> u64 {
        self.frames_evaluated
    }

    pub fn successful_tracks(&self) -> u64 {
        self.successful_tracks
    }

    pub fn target_losses(&self) -> u64 {
        self.target_losses
    }

    pub fn fps_samples(&self) -> &[f64] {
        &self.fps
    }

    pub fn detection_times(&self) -> &[Duration] {
        &self.detection_times
    }

    pub fn tracking_offsets(&self) -> &[f64] {
        &self.tracking_offsets
    }

    pub fn detection_accuracy(&self) -> &[f64] {
        &self.detection_accuracy
    }

    /// Summarize everything recorded so far
    pub fn finalize(&self) -> MetricsSummary {
        let times: Vec<f64> = self
            .detection_times
            .iter()
            .map(Duration::as_secs_f64)
            .collect();
        MetricsSummary {
            frames_evaluated: self.frames_evaluated,
            total_frames: self.total_frames,
            successful_tracks: self.successful_tracks,
            target_losses: self.target_losses,
            mean_detection_time_secs: mean(&times),
            mean_fps: mean(&self.fps),
            track_success_rate: self.successful_tracks as f64
                / self.total_frames.max(1) as f64
                * 100.0,
            mean_tracking_offset: mean(&self.tracking_offsets),
            mean_detection_iou: mean(&self.detection_accuracy),
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// End-of-session report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub frames_evaluated: u64,
    pub total_frames: u64,
    pub successful_tracks: u64,
    pub target_losses: u64,
    pub mean_detection_time_secs: Option<f64>,
    pub mean_fps: Option<f64>,
    /// Percentage of frames with the target inside the loss threshold
    pub track_success_rate: f64,
    pub mean_tracking_offset: Option<f64>,
    pub mean_detection_iou: Option<f64>,
}

impl fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn opt(value: Option<f64>, precision: usize) -> String {
            value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.precision$}"))
        }

        writeln!(f, "Performance Report")?;
        writeln!(f, "{}", "=".repeat(30))?;
        writeln!(
            f,
            "Avg Detection Time: {}s",
            opt(self.mean_detection_time_secs, 4)
        )?;
        writeln!(f, "Avg FPS: {}", opt(self.mean_fps, 2))?;
        writeln!(f, "Total Frames: {}", self.total_frames)?;
        writeln!(f, "Tracking Success Rate: {:.2}%", self.track_success_rate)?;
        writeln!(
            f,
            "Avg Tracking Offset: {}",
            opt(self.mean_tracking_offset, 4)
        )?;
        write!(f, "Avg Detection IoU: {}", opt(self.mean_detection_iou, 4))
    }
}
