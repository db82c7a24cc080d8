use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use image::{ImageFormat, Rgb, RgbImage};

use melon_leaf::config::AppConfig;
use melon_leaf::detect::backends::ScriptedBackend;
use melon_leaf::detect::{DetectionEngine, ModelHandle, Threshold};
use melon_leaf::live::TickStatus;
use melon_leaf::session::LOGIN_FAILED;
use melon_leaf::storage::HistoryStore;
use melon_leaf::upload::SaveStatus;
use melon_leaf::{
    Annotator, DetectError, DetectionMode, InMemoryStore, Page, RegisterOutcome, Session,
    StillImagePipeline,
};

fn names() -> Vec<String> {
    vec!["downy mildew".into(), "cucumber mosaic virus".into(), "daun sehat".into()]
}

fn demo_model() -> Arc<ModelHandle> {
    Arc::new(ModelHandle::ready(DetectionEngine::new(Box::new(
        ScriptedBackend::demo(names()),
    ))))
}

fn png() -> Vec<u8> {
    let img = RgbImage::from_pixel(40, 30, Rgb([90, 140, 60]));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

fn signed_in() -> Session<InMemoryStore> {
    let mut session = Session::new(InMemoryStore::default(), Threshold::DEFAULT);
    session.register("petani", "rahasia", "rahasia").unwrap();
    assert!(session.login("petani", "rahasia").unwrap());
    session
}

#[test]
fn register_validates_before_touching_the_store() {
    let mut session = Session::new(InMemoryStore::default(), Threshold::DEFAULT);
    assert_eq!(session.page(), Page::Login);
    assert_eq!(session.navigate("register"), Page::Register);

    assert_eq!(session.register("", "x", "x").unwrap(), RegisterOutcome::EmptyFields);
    assert_eq!(session.register("petani", "", "").unwrap(), RegisterOutcome::EmptyFields);
    assert_eq!(
        session.register("petani", "rahasia", "rahasi").unwrap(),
        RegisterOutcome::PasswordMismatch
    );
    assert_eq!(session.page(), Page::Register);

    let ok = session.register("petani", "rahasia", "rahasia").unwrap();
    assert_eq!(ok, RegisterOutcome::Registered);
    assert_eq!(ok.message(), "Akun berhasil dibuat! Silakan login.");
    assert_eq!(session.page(), Page::Login);

    assert_eq!(
        session.register("petani", "lain", "lain").unwrap(),
        RegisterOutcome::UsernameTaken
    );
}

#[test]
fn login_and_navigation_rules() {
    let mut session = Session::new(InMemoryStore::default(), Threshold::DEFAULT);
    session.register("petani", "rahasia", "rahasia").unwrap();

    assert!(!session.login("petani", "salah").unwrap());
    assert!(!session.is_logged_in());
    assert_eq!(LOGIN_FAILED, "Username atau Password salah.");

    assert_eq!(session.navigate("history"), Page::Login);
    assert_eq!(session.navigate("tidak-ada"), Page::Login);

    assert!(session.login("petani", "rahasia").unwrap());
    assert_eq!(session.username(), Some("petani"));
    assert_eq!(session.page(), Page::MainApp(DetectionMode::Upload));

    assert_eq!(session.navigate("about_app"), Page::About);
    assert_eq!(session.navigate("history"), Page::History);
    assert_eq!(session.navigate("login"), Page::MainApp(DetectionMode::Upload));
    assert_eq!(session.navigate("tidak-ada"), Page::MainApp(DetectionMode::Upload));

    session.select_mode(DetectionMode::Webcam);
    assert_eq!(session.page(), Page::MainApp(DetectionMode::Webcam));
    assert_eq!(Page::from_key(session.page().key()), Some(Page::MainApp(DetectionMode::Upload)));
}

#[test]
fn upload_history_and_logout_reset() {
    let mut session = signed_in();
    let pipeline = StillImagePipeline::new(demo_model(), Annotator::new(), AppConfig::default().upload);
    let bytes = png();

    session.set_upload_threshold(Threshold::new(0.4).unwrap());
    let outcome = session.submit_upload(&pipeline, &bytes).unwrap();
    assert!(matches!(outcome.save, SaveStatus::Saved(_)));
    let again = session.submit_upload(&pipeline, &bytes).unwrap();
    assert_eq!(again.save, SaveStatus::AlreadySaved);

    let history = session.history().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].disease_name, "downy mildew");

    session.logout();
    assert!(!session.is_logged_in());
    assert_eq!(session.page(), Page::Login);
    assert!(session.upload().result().is_none());
    assert_eq!(session.upload_threshold(), Threshold::DEFAULT);
    assert!(session.history().unwrap().is_empty());

    let err = session.submit_upload(&pipeline, &bytes).unwrap_err();
    assert!(matches!(err, DetectError::Persistence(_)));
}

#[test]
fn records_of_other_users_cannot_be_deleted() {
    let mut store = InMemoryStore::default();
    let foreign = store
        .add_detection_record("tetangga", "downy mildew", 0.7, None)
        .unwrap();
    let mut session = Session::new(store, Threshold::DEFAULT);
    session.register("petani", "rahasia", "rahasia").unwrap();
    session.login("petani", "rahasia").unwrap();

    let pipeline = StillImagePipeline::new(demo_model(), Annotator::new(), AppConfig::default().upload);
    session.submit_upload(&pipeline, &png()).unwrap();
    let own = session.history().unwrap()[0].id;

    assert!(!session.delete_record(foreign).unwrap());
    assert_eq!(session.store().len(), 2);
    assert!(session.delete_record(own).unwrap());
    assert!(!session.delete_record(own).unwrap());
    assert!(session.history().unwrap().is_empty());
}

#[test]
fn webcam_summaries_reach_the_page_and_stop_on_leave() {
    let mut session = signed_in();
    assert!(session.poll_live().diseases.is_empty());
    assert_eq!(session.poll_live().status(), TickStatus::Waiting);

    let mut live = AppConfig::default().live;
    live.source = "stub://kebun?frames=10".to_string();
    live.frame_width = 320;
    live.frame_height = 240;
    live.target_fps = 0;

    session
        .start_webcam(&live, demo_model(), Annotator::new())
        .unwrap();
    assert_eq!(session.page(), Page::MainApp(DetectionMode::Webcam));
    assert!(session
        .live_stream()
        .unwrap()
        .wait_finished(Duration::from_secs(20)));

    let summary = session.poll_live().clone();
    assert_eq!(summary.status(), TickStatus::Detected);
    assert_eq!(summary.diseases, vec!["downy mildew"]);
    assert_eq!(summary.note, "Deteksi berhasil.");
    // Nothing new arrived: the last summary stays on screen.
    assert_eq!(session.poll_live(), &summary);

    session.navigate("history");
    assert!(session.live_stream().is_none());
    assert_eq!(session.poll_live().status(), TickStatus::Waiting);
    assert_eq!(session.poll_live().note, "Menunggu aktivasi webcam.");
}

#[test]
fn webcam_without_model_reports_unavailable() {
    let mut session = signed_in();
    let model = Arc::new(ModelHandle::new(|| Err(anyhow!("no weights"))));
    let err = session
        .start_webcam(&AppConfig::default().live, model, Annotator::new())
        .unwrap_err();
    assert!(matches!(err, DetectError::ModelUnavailable(_)));
    assert!(session.live_stream().is_none());
    assert_eq!(session.page(), Page::MainApp(DetectionMode::Upload));
}

#[test]
fn unusable_camera_source_is_a_stream_start_error() {
    let mut session = signed_in();
    let mut live = AppConfig::default().live;
    live.source = "rtsp://kamera-kebun/stream".to_string();

    let err = session
        .start_webcam(&live, demo_model(), Annotator::new())
        .unwrap_err();
    assert!(matches!(err, DetectError::StreamStart(ref msg) if msg.contains("rtsp://")));
    assert_eq!(err.user_message(), "Gagal memulai webcam. Periksa sumber video.");
    assert!(session.live_stream().is_none());
    assert_eq!(session.page(), Page::MainApp(DetectionMode::Upload));
}
