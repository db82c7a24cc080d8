use std::sync::Arc;

use image::RgbImage;

use super::session::UploadSession;
use super::verdict::LeafVerdict;
use crate::annotate::Annotator;
use crate::config::UploadSettings;
use crate::detect::{Detection, ModelHandle, Threshold};
use crate::error::DetectError;
use crate::live::summary::NOT_DETECTED;
use crate::storage::{encode_image, HistoryStore};

pub const NO_DETECTION_SUMMARY: &str = "Tidak ada deteksi yang melewati ambang batas.";

/// Everything derived from one image at one threshold.
#[derive(Clone, Debug)]
pub struct StillResult {
    pub original: RgbImage,
    pub annotated: RgbImage,
    pub detections: Vec<Detection>,
    /// `name (0.82), name (0.61)` or the no-detection sentence.
    pub summary_text: String,
    /// 0.0 when nothing passed the threshold.
    pub highest_confidence: f32,
    /// One entry per detection, duplicates kept.
    pub detected_class_names: Vec<String>,
    /// Parallel to `detected_class_names`.
    pub confidences: Vec<f32>,
}

impl StillResult {
    fn new(original: RgbImage, annotated: RgbImage, detections: Vec<Detection>) -> Self {
        let summary_text = if detections.is_empty() {
            NO_DETECTION_SUMMARY.to_string()
        } else {
            detections
                .iter()
                .map(|d| format!("{} ({:.2})", d.class_name, d.confidence))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let highest_confidence = detections
            .iter()
            .map(|d| d.confidence)
            .fold(0.0f32, f32::max);
        Self {
            original,
            annotated,
            summary_text,
            highest_confidence,
            detected_class_names: detections.iter().map(|d| d.class_name.clone()).collect(),
            confidences: detections.iter().map(|d| d.confidence).collect(),
            detections,
        }
    }

    pub fn unique_class_names(&self) -> Vec<String> {
        let mut unique: Vec<String> = Vec::new();
        for name in &self.detected_class_names {
            if !unique.contains(name) {
                unique.push(name.clone());
            }
        }
        unique
    }

    /// Label stored in history: unique names joined, or the not-detected tag.
    pub fn history_label(&self) -> String {
        let unique = self.unique_class_names();
        if unique.is_empty() {
            NOT_DETECTED.to_string()
        } else {
            unique.join(", ")
        }
    }
}

/// What happened to the history record on this run.
#[derive(Debug, PartialEq)]
pub enum SaveStatus {
    Saved(i64),
    /// This `(hash, threshold)` pair was stored earlier in the session.
    AlreadySaved,
    /// Nothing passed the threshold and empty results are not kept.
    SkippedEmpty,
    /// The store rejected the write; the detection itself is still shown.
    Failed(DetectError),
}

#[derive(Debug, PartialEq)]
pub struct UploadOutcome {
    /// Inference ran on this call.
    pub reprocessed: bool,
    pub save: SaveStatus,
}

/// Single-image detection, annotation and idempotent persistence.
pub struct StillImagePipeline {
    model: Arc<ModelHandle>,
    annotator: Annotator,
    settings: UploadSettings,
}

impl StillImagePipeline {
    pub fn new(model: Arc<ModelHandle>, annotator: Annotator, settings: UploadSettings) -> Self {
        Self {
            model,
            annotator,
            settings,
        }
    }

    pub fn default_threshold(&self) -> Result<Threshold, DetectError> {
        Threshold::new(self.settings.default_threshold)
    }

    /// Decode, infer and annotate one image. No session state involved.
    pub fn detect(&self, bytes: &[u8], threshold: Threshold) -> Result<StillResult, DetectError> {
        let engine = self.model.get()?;
        let original = image::load_from_memory(bytes)
            .map_err(|e| DetectError::Decode(e.to_string()))?
            .to_rgb8();
        let inference = engine.infer(&original, threshold)?;
        let annotated = self.annotator.annotate(&original, &inference.detections);
        Ok(StillResult::new(original, annotated, inference.detections))
    }

    /// Process the session's current upload for `username`.
    ///
    /// Re-running with unchanged bytes and threshold touches neither the
    /// model nor the store.
    pub fn run(
        &self,
        session: &mut UploadSession,
        bytes: &[u8],
        threshold: Threshold,
        username: &str,
        store: &mut dyn HistoryStore,
    ) -> Result<UploadOutcome, DetectError> {
        session.accept(bytes);

        let reprocessed = session.needs_processing(threshold);
        if reprocessed {
            let result = self.detect(bytes, threshold)?;
            log::info!(
                "upload {} at threshold {:.2}: {}",
                short_hash(session.content_hash()),
                threshold.value(),
                result.summary_text
            );
            session.store_result(threshold, result);
        }

        let save = self.persist(session, threshold, username, store);
        Ok(UploadOutcome { reprocessed, save })
    }

    fn persist(
        &self,
        session: &mut UploadSession,
        threshold: Threshold,
        username: &str,
        store: &mut dyn HistoryStore,
    ) -> SaveStatus {
        if session.is_saved(threshold) {
            return SaveStatus::AlreadySaved;
        }
        let Some(result) = session.result() else {
            return SaveStatus::SkippedEmpty;
        };
        if result.detections.is_empty() && !self.settings.save_empty_results {
            return SaveStatus::SkippedEmpty;
        }

        let saved = encode_image(&result.annotated).and_then(|encoded| {
            store.add_detection_record(
                username,
                &result.history_label(),
                result.highest_confidence,
                Some(&encoded),
            )
        });
        match saved {
            Ok(id) => {
                session.mark_saved(threshold);
                SaveStatus::Saved(id)
            }
            Err(err) => {
                log::error!("failed to save detection for {}: {:#}", username, err);
                SaveStatus::Failed(DetectError::persistence(format!("{:#}", err)))
            }
        }
    }

    pub fn verdict(&self, result: &StillResult) -> LeafVerdict {
        LeafVerdict::from_result(result, &self.settings.healthy_class)
    }
}

fn short_hash(hash: Option<&str>) -> &str {
    hash.map(|h| &h[..h.len().min(12)]).unwrap_or("-")
}
