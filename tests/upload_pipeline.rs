use std::io::Cursor;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use image::{ImageFormat, Rgb, RgbImage};

use melon_leaf::config::AppConfig;
use melon_leaf::detect::backends::{Script, ScriptProbe, ScriptedBackend};
use melon_leaf::detect::{BoundingBox, DetectionEngine, ModelHandle, RawBox, Threshold};
use melon_leaf::storage::{HistoryRecord, HistoryStore, InMemoryStore};
use melon_leaf::upload::{
    LeafVerdict, SaveStatus, StillImagePipeline, UploadSession, AMBIGUITY_WARNING,
    NO_DETECTION_SUMMARY,
};
use melon_leaf::{Annotator, DetectError};

fn names() -> Vec<String> {
    vec!["downy mildew".into(), "cucumber mosaic virus".into(), "daun sehat".into()]
}

fn lesion(class_index: usize, confidence: f32) -> RawBox {
    RawBox {
        class_index,
        confidence,
        bbox: BoundingBox::new(8.0, 8.0, 40.0, 40.0),
    }
}

fn png(shade: u8) -> Vec<u8> {
    let img = RgbImage::from_pixel(64, 48, Rgb([shade, 120, 40]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).expect("encode png");
    buf.into_inner()
}

fn threshold(value: f32) -> Threshold {
    Threshold::new(value).expect("valid threshold")
}

fn pipeline(backend: ScriptedBackend) -> (StillImagePipeline, ScriptProbe) {
    pipeline_with(backend, AppConfig::default())
}

fn pipeline_with(backend: ScriptedBackend, cfg: AppConfig) -> (StillImagePipeline, ScriptProbe) {
    let probe = backend.probe();
    let model = Arc::new(ModelHandle::ready(DetectionEngine::new(Box::new(backend))));
    (StillImagePipeline::new(model, Annotator::new(), cfg.upload), probe)
}

struct BrokenStore;

impl HistoryStore for BrokenStore {
    fn add_detection_record(&mut self, _: &str, _: &str, _: f32, _: Option<&str>) -> Result<i64> {
        Err(anyhow!("database is locked"))
    }

    fn detection_history(&mut self, _: &str) -> Result<Vec<HistoryRecord>> {
        Ok(Vec::new())
    }

    fn delete_detection_record(&mut self, _: i64) -> Result<bool> {
        Ok(false)
    }

    fn delete_user_record(&mut self, _: &str, _: i64) -> Result<bool> {
        Ok(false)
    }
}

#[test]
fn one_detection_passes_and_the_weaker_one_is_dropped() {
    let backend = ScriptedBackend::new(names())
        .otherwise(Script::Boxes(vec![lesion(0, 0.82), lesion(0, 0.41)]));
    let (pipeline, _probe) = pipeline(backend);

    let result = pipeline.detect(&png(1), threshold(0.5)).unwrap();
    assert_eq!(result.detections.len(), 1);
    assert_eq!(result.summary_text, "downy mildew (0.82)");
    assert!((result.highest_confidence - 0.82).abs() < 1e-6);
    assert_eq!(result.detected_class_names, vec!["downy mildew"]);
    assert_eq!(result.original.dimensions(), result.annotated.dimensions());
    assert_ne!(result.original, result.annotated);

    let verdict = pipeline.verdict(&result);
    assert_eq!(
        verdict,
        LeafVerdict::Diseased {
            diseases: vec!["downy mildew".to_string()]
        }
    );
    assert_eq!(verdict.headline(), "Penyakit Terdeteksi: downy mildew");
    assert!(verdict.warning().is_none());
}

#[test]
fn same_image_and_threshold_is_processed_and_saved_once() {
    let backend = ScriptedBackend::new(names()).otherwise(Script::Boxes(vec![lesion(1, 0.7)]));
    let (pipeline, probe) = pipeline(backend);
    let mut session = UploadSession::new();
    let mut store = InMemoryStore::default();
    let bytes = png(2);

    let first = pipeline
        .run(&mut session, &bytes, threshold(0.5), "petani", &mut store)
        .unwrap();
    assert!(first.reprocessed);
    assert!(matches!(first.save, SaveStatus::Saved(_)));

    for _ in 0..3 {
        let again = pipeline
            .run(&mut session, &bytes, threshold(0.5), "petani", &mut store)
            .unwrap();
        assert!(!again.reprocessed);
        assert_eq!(again.save, SaveStatus::AlreadySaved);
    }
    assert_eq!(probe.calls(), 1);
    assert_eq!(store.len(), 1);

    let history = store.detection_history("petani").unwrap();
    assert_eq!(history[0].disease_name, "cucumber mosaic virus");
    assert!((history[0].confidence - 0.7).abs() < 1e-6);
    let stored = history[0].decode_image().unwrap().unwrap();
    assert_eq!(stored, session.result().unwrap().annotated);
}

#[test]
fn threshold_change_reprocesses_and_saves_one_new_record() {
    let backend = ScriptedBackend::new(names())
        .otherwise(Script::Boxes(vec![lesion(0, 0.82), lesion(2, 0.41)]));
    let (pipeline, probe) = pipeline(backend);
    let mut session = UploadSession::new();
    let mut store = InMemoryStore::default();
    let bytes = png(3);

    pipeline
        .run(&mut session, &bytes, threshold(0.5), "petani", &mut store)
        .unwrap();
    let lowered = pipeline
        .run(&mut session, &bytes, threshold(0.3), "petani", &mut store)
        .unwrap();
    assert!(lowered.reprocessed);
    assert!(matches!(lowered.save, SaveStatus::Saved(_)));
    let repeat = pipeline
        .run(&mut session, &bytes, threshold(0.3), "petani", &mut store)
        .unwrap();
    assert_eq!(repeat.save, SaveStatus::AlreadySaved);

    assert_eq!(probe.calls(), 2);
    assert_eq!(store.len(), 2);
    assert_eq!(session.last_processed_threshold(), Some(threshold(0.3)));

    let result = session.result().unwrap();
    assert_eq!(result.summary_text, "downy mildew (0.82), daun sehat (0.41)");
    assert_eq!(result.history_label(), "downy mildew, daun sehat");

    let verdict = pipeline.verdict(result);
    assert!(matches!(verdict, LeafVerdict::DiseasedWithHealthy { .. }));
    assert_eq!(verdict.warning(), Some(AMBIGUITY_WARNING));
}

#[test]
fn returning_to_an_earlier_threshold_or_file_does_not_save_again() {
    let backend = ScriptedBackend::new(names()).otherwise(Script::Boxes(vec![lesion(0, 0.9)]));
    let (pipeline, probe) = pipeline(backend);
    let mut session = UploadSession::new();
    let mut store = InMemoryStore::default();
    let leaf = png(12);
    let other = png(13);

    for t in [0.5, 0.6, 0.5] {
        pipeline
            .run(&mut session, &leaf, threshold(t), "petani", &mut store)
            .unwrap();
    }
    assert_eq!(store.len(), 2);
    assert_eq!(probe.calls(), 3, "the earlier threshold is recomputed, not re-saved");

    pipeline
        .run(&mut session, &other, threshold(0.5), "petani", &mut store)
        .unwrap();
    let back = pipeline
        .run(&mut session, &leaf, threshold(0.5), "petani", &mut store)
        .unwrap();
    assert!(back.reprocessed);
    assert_eq!(back.save, SaveStatus::AlreadySaved);
    assert_eq!(store.len(), 3);

    session.reset();
    let fresh = pipeline
        .run(&mut session, &leaf, threshold(0.5), "petani", &mut store)
        .unwrap();
    assert!(matches!(fresh.save, SaveStatus::Saved(_)));
    assert_eq!(store.len(), 4);
}

#[test]
fn a_new_file_resets_session_state() {
    let backend = ScriptedBackend::new(names()).otherwise(Script::Boxes(vec![lesion(0, 0.9)]));
    let (pipeline, probe) = pipeline(backend);
    let mut session = UploadSession::new();
    let mut store = InMemoryStore::default();

    pipeline
        .run(&mut session, &png(4), threshold(0.5), "petani", &mut store)
        .unwrap();
    let first_hash = session.content_hash().map(str::to_string);
    let other = pipeline
        .run(&mut session, &png(5), threshold(0.5), "petani", &mut store)
        .unwrap();

    assert!(other.reprocessed);
    assert!(matches!(other.save, SaveStatus::Saved(_)));
    assert_ne!(session.content_hash().map(str::to_string), first_hash);
    assert_eq!(probe.calls(), 2);
    assert_eq!(store.len(), 2);
}

#[test]
fn empty_result_is_shown_but_not_saved() {
    let backend = ScriptedBackend::new(names()).otherwise(Script::Boxes(vec![lesion(0, 0.2)]));
    let (pipeline, _probe) = pipeline(backend);
    let mut session = UploadSession::new();
    let mut store = InMemoryStore::default();

    let outcome = pipeline
        .run(&mut session, &png(6), threshold(0.5), "petani", &mut store)
        .unwrap();
    assert_eq!(outcome.save, SaveStatus::SkippedEmpty);
    assert!(store.is_empty());

    let result = session.result().unwrap();
    assert_eq!(result.summary_text, NO_DETECTION_SUMMARY);
    assert_eq!(result.highest_confidence, 0.0);
    assert_eq!(result.original, result.annotated);
    assert_eq!(pipeline.verdict(result), LeafVerdict::NoneAboveThreshold);
}

#[test]
fn empty_results_can_be_kept_when_configured() {
    let mut cfg = AppConfig::default();
    cfg.upload.save_empty_results = true;
    let (pipeline, _probe) = pipeline_with(ScriptedBackend::new(names()), cfg);
    let mut session = UploadSession::new();
    let mut store = InMemoryStore::default();

    let outcome = pipeline
        .run(&mut session, &png(7), threshold(0.5), "petani", &mut store)
        .unwrap();
    assert!(matches!(outcome.save, SaveStatus::Saved(_)));
    let history = store.detection_history("petani").unwrap();
    assert_eq!(history[0].disease_name, "Tidak Terdeteksi");
    assert_eq!(history[0].confidence, 0.0);
}

#[test]
fn healthy_only_verdict() {
    let backend = ScriptedBackend::new(names()).otherwise(Script::Boxes(vec![lesion(2, 0.93)]));
    let (pipeline, _probe) = pipeline(backend);
    let result = pipeline.detect(&png(8), threshold(0.5)).unwrap();
    let verdict = pipeline.verdict(&result);
    assert_eq!(verdict, LeafVerdict::Healthy);
    assert_eq!(verdict.headline(), "Daun melon terlihat Sehat");
}

#[test]
fn undecodable_upload_is_a_decode_error() {
    let (pipeline, probe) = pipeline(ScriptedBackend::new(names()));
    let mut session = UploadSession::new();
    let mut store = InMemoryStore::default();

    let err = pipeline
        .run(&mut session, b"not an image", threshold(0.5), "petani", &mut store)
        .unwrap_err();
    assert!(matches!(err, DetectError::Decode(_)));
    assert_eq!(probe.calls(), 0);
    assert!(store.is_empty());
}

#[test]
fn unavailable_model_fails_the_upload() {
    let model = Arc::new(ModelHandle::new(|| Err(anyhow!("models/best.onnx missing"))));
    let pipeline = StillImagePipeline::new(model, Annotator::new(), AppConfig::default().upload);
    let err = pipeline.detect(&png(9), threshold(0.5)).unwrap_err();
    assert!(matches!(err, DetectError::ModelUnavailable(ref msg) if msg.contains("best.onnx")));
    assert_eq!(err.user_message(), "Error: Model tidak tersedia.");
}

#[test]
fn store_failure_keeps_the_result_and_retries_later() {
    let backend = ScriptedBackend::new(names()).otherwise(Script::Boxes(vec![lesion(0, 0.6)]));
    let (pipeline, probe) = pipeline(backend);
    let mut session = UploadSession::new();
    let bytes = png(10);

    let failed = pipeline
        .run(&mut session, &bytes, threshold(0.5), "petani", &mut BrokenStore)
        .unwrap();
    assert!(matches!(failed.save, SaveStatus::Failed(DetectError::Persistence(ref m)) if m.contains("locked")));
    assert!(session.result().is_some());

    let mut store = InMemoryStore::default();
    let retried = pipeline
        .run(&mut session, &bytes, threshold(0.5), "petani", &mut store)
        .unwrap();
    assert!(!retried.reprocessed);
    assert!(matches!(retried.save, SaveStatus::Saved(_)));
    assert_eq!(probe.calls(), 1);
}

#[test]
fn raising_the_threshold_only_removes_detections() {
    let boxes: Vec<RawBox> = [0.93, 0.82, 0.64, 0.51, 0.47, 0.33, 0.26]
        .iter()
        .enumerate()
        .map(|(i, &c)| RawBox {
            class_index: i % 3,
            confidence: c,
            bbox: BoundingBox::new(i as f32 * 6.0, 2.0, i as f32 * 6.0 + 5.0, 20.0),
        })
        .collect();
    let backend = ScriptedBackend::new(names()).otherwise(Script::Boxes(boxes));
    let (pipeline, _probe) = pipeline(backend);
    let bytes = png(11);

    let steps = [0.1, 0.3, 0.5, 0.65, 0.9];
    let sets: Vec<Vec<(String, u32)>> = steps
        .iter()
        .map(|&t| {
            pipeline
                .detect(&bytes, threshold(t))
                .unwrap()
                .detections
                .iter()
                .map(|d| (d.class_name.clone(), d.confidence.to_bits()))
                .collect()
        })
        .collect();
    for pair in sets.windows(2) {
        assert!(pair[1].iter().all(|d| pair[0].contains(d)));
        assert!(pair[1].len() <= pair[0].len());
    }
    assert_eq!(sets[0].len(), 7);
    assert_eq!(sets[4].len(), 1);
}

#[test]
fn invalid_thresholds_are_rejected() {
    assert!(matches!(Threshold::new(0.0), Err(DetectError::InvalidThreshold(_))));
    assert!(Threshold::new(1.2).is_err());
    assert!(Threshold::new(1.0).is_ok());
}
