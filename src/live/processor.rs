use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use image::RgbImage;

use super::queue::SummarySender;
use super::summary::DetectionSummary;
use crate::annotate::Annotator;
use crate::config::LiveSettings;
use crate::detect::{Detection, ModelHandle, Threshold};
use crate::error::DetectError;
use crate::frame::{resize_for_inference, ScaleFactors};

/// Tuning for one live stream.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProcessorSettings {
    pub process_interval: u64,
    pub inference_size: u32,
    pub threshold: Threshold,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            process_interval: 5,
            inference_size: 480,
            threshold: Threshold::DEFAULT,
        }
    }
}

impl TryFrom<&LiveSettings> for ProcessorSettings {
    type Error = DetectError;

    fn try_from(live: &LiveSettings) -> Result<Self, Self::Error> {
        Ok(Self {
            process_interval: live.process_interval.max(1),
            inference_size: live.inference_size,
            threshold: Threshold::new(live.confidence)?,
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    pub frames: u64,
    pub inference_ticks: u64,
    pub failed_ticks: u64,
}

/// Per-stream frame processor.
///
/// Runs inference on every `process_interval`-th frame, draws the
/// detections back onto the native-resolution frame and publishes one
/// summary per inference tick. Between ticks the last annotated frame is
/// returned unchanged, or the raw frame before the first tick.
pub struct LiveAnnotationProcessor {
    model: Arc<ModelHandle>,
    annotator: Annotator,
    settings: ProcessorSettings,
    summaries: SummarySender,
    frame_counter: u64,
    last_inference_dims: Option<(u32, u32)>,
    last_annotated: Option<Arc<RgbImage>>,
    last_detections: Vec<Detection>,
    stats: ProcessorStats,
}

impl LiveAnnotationProcessor {
    pub fn new(
        model: Arc<ModelHandle>,
        annotator: Annotator,
        settings: ProcessorSettings,
        summaries: SummarySender,
    ) -> Self {
        Self {
            model,
            annotator,
            settings: ProcessorSettings {
                process_interval: settings.process_interval.max(1),
                ..settings
            },
            summaries,
            frame_counter: 0,
            last_inference_dims: None,
            last_annotated: None,
            last_detections: Vec::new(),
            stats: ProcessorStats::default(),
        }
    }

    /// Handle one incoming frame at native resolution.
    pub fn process_frame(&mut self, frame: RgbImage) -> Arc<RgbImage> {
        self.frame_counter += 1;
        self.stats.frames += 1;

        if self.frame_counter % self.settings.process_interval != 0 {
            return match &self.last_annotated {
                Some(annotated) => Arc::clone(annotated),
                None => Arc::new(frame),
            };
        }

        self.stats.inference_ticks += 1;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_inference(&frame)))
            .unwrap_or_else(|payload| Err(DetectError::Inference(panic_message(payload))));

        match outcome {
            Ok((annotated, summary)) => {
                log::debug!(
                    "frame {}: {:?} {:?} avg {:.2}",
                    self.frame_counter,
                    summary.status(),
                    summary.diseases,
                    summary.avg_confidence
                );
                let annotated = Arc::new(annotated);
                self.last_annotated = Some(Arc::clone(&annotated));
                self.summaries.publish(summary);
                annotated
            }
            Err(err) => {
                log::warn!("frame {}: inference tick failed: {}", self.frame_counter, err);
                self.stats.failed_ticks += 1;
                self.last_detections.clear();
                let raw = Arc::new(frame);
                self.last_annotated = Some(Arc::clone(&raw));
                self.summaries.publish(DetectionSummary::error(&err));
                raw
            }
        }
    }

    fn run_inference(&mut self, frame: &RgbImage) -> Result<(RgbImage, DetectionSummary), DetectError> {
        let engine = self.model.get()?;
        let input = resize_for_inference(frame, self.settings.inference_size);
        let inference_dims = input.dimensions();
        self.last_inference_dims = Some(inference_dims);

        let inference = engine.infer(&input, self.settings.threshold)?;
        let factors = ScaleFactors::between(frame.dimensions(), inference_dims);
        let native: Vec<Detection> = inference
            .detections
            .iter()
            .map(|d| Detection {
                bbox: factors.apply(&d.bbox),
                ..d.clone()
            })
            .collect();

        let annotated = self.annotator.annotate(frame, &native);
        let summary = DetectionSummary::from_detections(&native, inference.candidates);
        self.last_detections = native;
        Ok((annotated, summary))
    }

    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    /// Size of the last frame actually handed to the detector.
    pub fn last_inference_dims(&self) -> Option<(u32, u32)> {
        self.last_inference_dims
    }

    /// Detections of the last successful tick, in native frame coordinates.
    pub fn last_detections(&self) -> &[Detection] {
        &self.last_detections
    }

    pub fn last_annotated(&self) -> Option<&Arc<RgbImage>> {
        self.last_annotated.as_ref()
    }

    pub fn stats(&self) -> ProcessorStats {
        self.stats
    }

    pub fn dropped_summaries(&self) -> u64 {
        self.summaries.dropped()
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "detector panicked".to_string()
    }
}
