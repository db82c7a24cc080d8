//! Failure taxonomy shared by the still-image and live-video paths.
//!
//! Every failure is recovered at the component boundary that detects it.
//! `Display` carries the internal detail for logs; `user_message` is what a
//! person looking at the page is shown.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectError {
    /// The detection model could not be loaded (missing weights, unsupported runtime).
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// Uploaded bytes or an incoming frame could not be decoded as a raster image.
    #[error("image decode failed: {0}")]
    Decode(String),

    /// A single inference call failed.
    #[error("inference failed: {0}")]
    Inference(String),

    /// A history store write or delete failed.
    #[error("history store failure: {0}")]
    Persistence(String),

    /// The live stream could not be started (unknown or unreadable frame source).
    #[error("live stream failed to start: {0}")]
    StreamStart(String),

    #[error("confidence threshold {0} outside (0, 1]")]
    InvalidThreshold(f32),
}

impl DetectError {
    pub fn user_message(&self) -> &'static str {
        match self {
            DetectError::ModelUnavailable(_) => "Error: Model tidak tersedia.",
            DetectError::Decode(_) => "Gagal membaca gambar. Pastikan file berupa PNG atau JPEG yang valid.",
            DetectError::Inference(_) => "Terjadi kesalahan saat menjalankan deteksi.",
            DetectError::Persistence(_) => "Gagal menyimpan catatan deteksi ke database.",
            DetectError::StreamStart(_) => "Gagal memulai webcam. Periksa sumber video.",
            DetectError::InvalidThreshold(_) => "Ambang batas kepercayaan harus di antara 0 dan 1.",
        }
    }

    pub(crate) fn persistence(err: impl std::fmt::Display) -> Self {
        DetectError::Persistence(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_keeps_internal_detail_for_logs() {
        let err = DetectError::ModelUnavailable("best.onnx not found".to_string());
        assert_eq!(err.to_string(), "model unavailable: best.onnx not found");
        assert_eq!(err.user_message(), "Error: Model tidak tersedia.");
    }
}
