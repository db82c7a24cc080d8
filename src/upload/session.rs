use std::collections::HashSet;

use sha2::{Digest, Sha256};

use super::pipeline::StillResult;
use crate::detect::Threshold;

/// Hex SHA-256 of uploaded bytes.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Per-session still-image state.
///
/// Processing is redone only when the content hash or the threshold
/// changes; a `(hash, threshold)` pair is persisted at most once.
#[derive(Default)]
pub struct UploadSession {
    raw_bytes: Option<Vec<u8>>,
    content_hash: Option<String>,
    last_processed_threshold: Option<Threshold>,
    result: Option<StillResult>,
    // `(content hash, threshold bits)` pairs already persisted.
    saved: HashSet<(String, u32)>,
}

impl UploadSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take in the current upload. A different file resets all derived
    /// state; returns true in that case. Saved pairs are kept, so switching
    /// back to an earlier file does not store it again.
    pub fn accept(&mut self, bytes: &[u8]) -> bool {
        let hash = content_hash(bytes);
        if self.content_hash.as_deref() == Some(hash.as_str()) {
            return false;
        }
        let saved = std::mem::take(&mut self.saved);
        *self = Self {
            raw_bytes: Some(bytes.to_vec()),
            content_hash: Some(hash),
            saved,
            ..Self::default()
        };
        true
    }

    /// Forget the upload, everything derived from it, and what was saved.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn raw_bytes(&self) -> Option<&[u8]> {
        self.raw_bytes.as_deref()
    }

    pub fn content_hash(&self) -> Option<&str> {
        self.content_hash.as_deref()
    }

    pub fn result(&self) -> Option<&StillResult> {
        self.result.as_ref()
    }

    pub fn last_processed_threshold(&self) -> Option<Threshold> {
        self.last_processed_threshold
    }

    pub fn needs_processing(&self, threshold: Threshold) -> bool {
        self.raw_bytes.is_some()
            && (self.result.is_none() || self.last_processed_threshold != Some(threshold))
    }

    pub fn is_saved(&self, threshold: Threshold) -> bool {
        match &self.content_hash {
            Some(hash) => self
                .saved
                .contains(&(hash.clone(), threshold.value().to_bits())),
            None => false,
        }
    }

    pub(crate) fn store_result(&mut self, threshold: Threshold, result: StillResult) {
        self.result = Some(result);
        self.last_processed_threshold = Some(threshold);
    }

    pub(crate) fn mark_saved(&mut self, threshold: Threshold) {
        if let Some(hash) = &self.content_hash {
            self.saved.insert((hash.clone(), threshold.value().to_bits()));
        }
    }
}
