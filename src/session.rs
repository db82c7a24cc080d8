//! Per-user session and page navigation.
//!
//! One `Session` holds everything a signed-in person has in flight: the
//! current page, the upload state, and the live stream with its latest
//! summary. `logout` puts every part of it back to the initial values.

use std::sync::Arc;

use anyhow::Result;

use crate::annotate::Annotator;
use crate::config::LiveSettings;
use crate::detect::{ModelHandle, Threshold};
use crate::error::DetectError;
use crate::live::{DetectionSummary, LiveStream, SummaryReceiver};
use crate::storage::{HistoryRecord, HistoryStore, UserStore};
use crate::upload::{StillImagePipeline, UploadOutcome, UploadSession};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DetectionMode {
    #[default]
    Upload,
    Webcam,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Page {
    Login,
    Register,
    MainApp(DetectionMode),
    History,
    About,
}

impl Page {
    pub fn key(&self) -> &'static str {
        match self {
            Page::Login => "login",
            Page::Register => "register",
            Page::MainApp(_) => "main_app",
            Page::History => "history",
            Page::About => "about_app",
        }
    }

    pub fn from_key(key: &str) -> Option<Page> {
        match key {
            "login" => Some(Page::Login),
            "register" => Some(Page::Register),
            "main_app" => Some(Page::MainApp(DetectionMode::Upload)),
            "history" => Some(Page::History),
            "about_app" => Some(Page::About),
            _ => None,
        }
    }

    fn requires_login(&self) -> bool {
        matches!(self, Page::MainApp(_) | Page::History | Page::About)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    EmptyFields,
    PasswordMismatch,
    UsernameTaken,
}

impl RegisterOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            RegisterOutcome::Registered => "Akun berhasil dibuat! Silakan login.",
            RegisterOutcome::EmptyFields => "Username dan Password tidak boleh kosong.",
            RegisterOutcome::PasswordMismatch => "Konfirmasi password tidak cocok.",
            RegisterOutcome::UsernameTaken => "Username sudah terdaftar. Gunakan username lain.",
        }
    }
}

pub const LOGIN_FAILED: &str = "Username atau Password salah.";

struct ActiveStream {
    stream: LiveStream,
    summaries: SummaryReceiver,
}

pub struct Session<S> {
    store: S,
    page: Page,
    username: Option<String>,
    upload: UploadSession,
    upload_threshold: Threshold,
    default_threshold: Threshold,
    live_info: DetectionSummary,
    live: Option<ActiveStream>,
}

impl<S: UserStore + HistoryStore> Session<S> {
    pub fn new(store: S, default_threshold: Threshold) -> Self {
        Self {
            store,
            page: Page::Login,
            username: None,
            upload: UploadSession::new(),
            upload_threshold: default_threshold,
            default_threshold,
            live_info: DetectionSummary::waiting(),
            live: None,
        }
    }

    pub fn page(&self) -> Page {
        self.page
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.username.is_some()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn login(&mut self, username: &str, password: &str) -> Result<bool> {
        if !self.store.verify_user(username, password)? {
            log::info!("login rejected for {}", username);
            return Ok(false);
        }
        self.username = Some(username.to_string());
        self.page = Page::MainApp(DetectionMode::Upload);
        Ok(true)
    }

    pub fn register(
        &mut self,
        username: &str,
        password: &str,
        confirm: &str,
    ) -> Result<RegisterOutcome> {
        if username.is_empty() || password.is_empty() {
            return Ok(RegisterOutcome::EmptyFields);
        }
        if password != confirm {
            return Ok(RegisterOutcome::PasswordMismatch);
        }
        if !self.store.add_user(username, password)? {
            return Ok(RegisterOutcome::UsernameTaken);
        }
        self.page = Page::Login;
        Ok(RegisterOutcome::Registered)
    }

    /// Go to the page named `key`. Unknown pages, and pages the login
    /// state does not allow, land on the main page or the login page.
    pub fn navigate(&mut self, key: &str) -> Page {
        let requested = Page::from_key(key);
        let target = match (requested, self.is_logged_in()) {
            (Some(page), true) if page.requires_login() => page,
            (_, true) => Page::MainApp(DetectionMode::Upload),
            (Some(page), false) if !page.requires_login() => page,
            (_, false) => Page::Login,
        };
        self.go(target);
        target
    }

    pub fn select_mode(&mut self, mode: DetectionMode) {
        if self.is_logged_in() {
            self.go(Page::MainApp(mode));
        }
    }

    fn go(&mut self, page: Page) {
        if page != Page::MainApp(DetectionMode::Webcam) {
            self.stop_webcam();
        }
        self.page = page;
    }

    pub fn logout(&mut self) {
        self.stop_webcam();
        self.username = None;
        self.page = Page::Login;
        self.upload.reset();
        self.upload_threshold = self.default_threshold;
        self.live_info = DetectionSummary::waiting();
    }

    // ------------------------------------------------------------------
    // Upload mode
    // ------------------------------------------------------------------

    pub fn upload_threshold(&self) -> Threshold {
        self.upload_threshold
    }

    pub fn set_upload_threshold(&mut self, threshold: Threshold) {
        self.upload_threshold = threshold;
    }

    pub fn upload(&self) -> &UploadSession {
        &self.upload
    }

    /// Submit the currently selected file.
    pub fn submit_upload(
        &mut self,
        pipeline: &StillImagePipeline,
        bytes: &[u8],
    ) -> Result<UploadOutcome, DetectError> {
        let username = self
            .username
            .clone()
            .ok_or_else(|| DetectError::Persistence("not logged in".to_string()))?;
        pipeline.run(
            &mut self.upload,
            bytes,
            self.upload_threshold,
            &username,
            &mut self.store,
        )
    }

    /// The file picker was emptied.
    pub fn clear_upload(&mut self) {
        self.upload.reset();
    }

    // ------------------------------------------------------------------
    // Webcam mode
    // ------------------------------------------------------------------

    pub fn start_webcam(
        &mut self,
        live: &LiveSettings,
        model: Arc<ModelHandle>,
        annotator: Annotator,
    ) -> Result<(), DetectError> {
        self.stop_webcam();
        model.get()?;
        let (stream, summaries) = LiveStream::start(live, model, annotator)
            .map_err(|e| DetectError::StreamStart(format!("{:#}", e)))?;
        self.live = Some(ActiveStream { stream, summaries });
        self.go(Page::MainApp(DetectionMode::Webcam));
        Ok(())
    }

    pub fn stop_webcam(&mut self) {
        if let Some(active) = self.live.take() {
            if let Err(err) = active.stream.stop() {
                log::error!("{:#}", err);
            }
        }
        self.live_info = DetectionSummary::waiting();
    }

    pub fn live_stream(&self) -> Option<&LiveStream> {
        self.live.as_ref().map(|a| &a.stream)
    }

    /// Pick up the newest live summary, if any arrived since the last poll.
    /// Without a playing stream the waiting summary is shown.
    pub fn poll_live(&mut self) -> &DetectionSummary {
        match &self.live {
            Some(active) => {
                if let Some(summary) = active.summaries.latest() {
                    self.live_info = summary;
                }
            }
            None => self.live_info = DetectionSummary::waiting(),
        }
        &self.live_info
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    pub fn history(&mut self) -> Result<Vec<HistoryRecord>> {
        match self.username.clone() {
            Some(username) => self.store.detection_history(&username),
            None => Ok(Vec::new()),
        }
    }

    /// Delete one of the signed-in user's records. Ids owned by someone
    /// else are left alone and report false.
    pub fn delete_record(&mut self, id: i64) -> Result<bool, DetectError> {
        let Some(username) = self.username.as_deref() else {
            return Ok(false);
        };
        self.store
            .delete_user_record(username, id)
            .map_err(DetectError::persistence)
    }
}
