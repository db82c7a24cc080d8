use serde::{Deserialize, Serialize};

use crate::detect::Detection;

pub const NOT_DETECTED: &str = "Tidak Terdeteksi";
pub const ERROR_TAG: &str = "Error";

const NOTE_DETECTED: &str = "Deteksi berhasil.";
const NOTE_BELOW_THRESHOLD: &str = "Tidak ada deteksi teridentifikasi dengan ambang batas ini.";
const NOTE_NOTHING: &str = "Tidak ada objek yang terdeteksi oleh model.";
const NOTE_WAITING: &str = "Menunggu aktivasi webcam.";

/// Outcome class of one live inference tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TickStatus {
    Detected,
    BelowThreshold,
    NothingDetected,
    Error,
    #[default]
    Waiting,
}

/// Snapshot published once per inference tick.
///
/// Serializes as `{diseases, avg_confidence, keterangan}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionSummary {
    /// Unique class names, in order of first appearance.
    pub diseases: Vec<String>,
    pub avg_confidence: f32,
    #[serde(rename = "keterangan")]
    pub note: String,
    #[serde(skip)]
    pub status: TickStatus,
}

impl DetectionSummary {
    /// Aggregate the detections that met the threshold.
    ///
    /// `candidates` is how many boxes the model returned before filtering.
    pub fn from_detections(detections: &[Detection], candidates: usize) -> Self {
        if detections.is_empty() {
            let status = if candidates == 0 {
                TickStatus::NothingDetected
            } else {
                TickStatus::BelowThreshold
            };
            return Self::not_detected(status);
        }
        let mut diseases: Vec<String> = Vec::new();
        for d in detections {
            if !diseases.iter().any(|n| n == &d.class_name) {
                diseases.push(d.class_name.clone());
            }
        }
        let avg_confidence =
            detections.iter().map(|d| d.confidence).sum::<f32>() / detections.len() as f32;
        Self {
            diseases,
            avg_confidence,
            note: NOTE_DETECTED.to_string(),
            status: TickStatus::Detected,
        }
    }

    fn not_detected(status: TickStatus) -> Self {
        let note = match status {
            TickStatus::BelowThreshold => NOTE_BELOW_THRESHOLD,
            _ => NOTE_NOTHING,
        };
        Self {
            diseases: vec![NOT_DETECTED.to_string()],
            avg_confidence: 0.0,
            note: note.to_string(),
            status,
        }
    }

    /// Summary for a tick whose inference failed.
    pub fn error(detail: impl std::fmt::Display) -> Self {
        Self {
            diseases: vec![ERROR_TAG.to_string()],
            avg_confidence: 0.0,
            note: format!("Terjadi kesalahan: {}", detail),
            status: TickStatus::Error,
        }
    }

    /// Shown while no stream is playing.
    pub fn waiting() -> Self {
        Self {
            diseases: Vec::new(),
            avg_confidence: 0.0,
            note: NOTE_WAITING.to_string(),
            status: TickStatus::Waiting,
        }
    }

    pub fn status(&self) -> TickStatus {
        self.status
    }
}
