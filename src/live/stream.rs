use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use image::RgbImage;

use super::processor::{LiveAnnotationProcessor, ProcessorSettings};
use super::queue::{latest_channel, summary_channel, LatestReceiver, SummaryReceiver};
use crate::annotate::Annotator;
use crate::config::LiveSettings;
use crate::detect::ModelHandle;
use crate::ingest::{self, FrameSource};

/// Frames handed back to the viewer, newest only.
pub type FrameReceiver = LatestReceiver<Arc<RgbImage>>;

/// Consecutive source errors after which the source is treated as gone.
pub const MAX_CONSECUTIVE_SOURCE_ERRORS: u32 = 30;

#[derive(Debug, Default)]
pub struct StreamStats {
    frames_delivered: AtomicU64,
    frames_rejected: AtomicU64,
    inference_ticks: AtomicU64,
    failed_ticks: AtomicU64,
}

impl StreamStats {
    pub fn frames_delivered(&self) -> u64 {
        self.frames_delivered.load(Ordering::Relaxed)
    }

    /// Frames the source failed to produce or that could not be normalized.
    /// None of them reached the processor.
    pub fn frames_rejected(&self) -> u64 {
        self.frames_rejected.load(Ordering::Relaxed)
    }

    pub fn inference_ticks(&self) -> u64 {
        self.inference_ticks.load(Ordering::Relaxed)
    }

    pub fn failed_ticks(&self) -> u64 {
        self.failed_ticks.load(Ordering::Relaxed)
    }
}

/// A running live stream: one worker thread pulling frames through the
/// processor. Dropping or stopping the handle tears the stream down and
/// discards the processor state.
pub struct LiveStream {
    display: FrameReceiver,
    stats: Arc<StreamStats>,
    shutdown: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl LiveStream {
    /// Open the configured source and start streaming.
    pub fn start(
        live: &LiveSettings,
        model: Arc<ModelHandle>,
        annotator: Annotator,
    ) -> Result<(Self, SummaryReceiver)> {
        let settings = ProcessorSettings::try_from(live)?;
        let source = ingest::open_source(live)?;
        let (tx, rx) = summary_channel(live.queue_depth);
        let processor = LiveAnnotationProcessor::new(model, annotator, settings, tx);
        let stream = Self::spawn(source, processor, live.target_fps)?;
        Ok((stream, rx))
    }

    /// Run `processor` over `source` on a dedicated thread. A `target_fps`
    /// of zero delivers frames as fast as the source yields them.
    pub fn spawn(
        mut source: Box<dyn FrameSource>,
        mut processor: LiveAnnotationProcessor,
        target_fps: u32,
    ) -> Result<Self> {
        let (frames, display) = latest_channel(1);
        let stats = Arc::new(StreamStats::default());
        let shutdown = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let frame_budget = (target_fps > 0).then(|| Duration::from_secs(1) / target_fps);

        let thread_stats = stats.clone();
        let thread_shutdown = shutdown.clone();
        let thread_finished = finished.clone();
        let join = std::thread::Builder::new()
            .name("live-stream".to_string())
            .spawn(move || {
                log::info!("live stream started on {}", source.describe());
                let mut source_errors = 0u32;
                while !thread_shutdown.load(Ordering::SeqCst) {
                    let started = Instant::now();
                    let raw = match source.next_frame() {
                        Ok(Some(raw)) => {
                            source_errors = 0;
                            raw
                        }
                        Ok(None) => {
                            log::info!("live source {} exhausted", source.describe());
                            break;
                        }
                        Err(err) => {
                            thread_stats.frames_rejected.fetch_add(1, Ordering::Relaxed);
                            source_errors += 1;
                            if source_errors >= MAX_CONSECUTIVE_SOURCE_ERRORS {
                                log::error!(
                                    "live source {} failed {} times in a row, giving up: {:#}",
                                    source.describe(),
                                    source_errors,
                                    err
                                );
                                break;
                            }
                            log::warn!("skipping frame from {}: {:#}", source.describe(), err);
                            continue;
                        }
                    };
                    match raw.into_rgb() {
                        Ok(frame) => {
                            let shown = processor.process_frame(frame);
                            frames.publish(shown);
                            let p = processor.stats();
                            thread_stats.frames_delivered.fetch_add(1, Ordering::Relaxed);
                            thread_stats.inference_ticks.store(p.inference_ticks, Ordering::Relaxed);
                            thread_stats.failed_ticks.store(p.failed_ticks, Ordering::Relaxed);
                        }
                        Err(err) => {
                            log::warn!("dropping malformed frame: {:#}", err);
                            thread_stats.frames_rejected.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    if let Some(budget) = frame_budget {
                        if let Some(rest) = budget.checked_sub(started.elapsed()) {
                            std::thread::sleep(rest);
                        }
                    }
                }
                thread_finished.store(true, Ordering::SeqCst);
                log::info!(
                    "live stream stopped after {} frames ({} summaries dropped)",
                    processor.frame_counter(),
                    processor.dropped_summaries()
                );
            })
            .map_err(|e| anyhow!("failed to spawn live stream thread: {}", e))?;

        Ok(Self {
            display,
            stats,
            shutdown,
            finished,
            join: Some(join),
        })
    }

    /// Newest frame to show; `None` when nothing new arrived since the last read.
    pub fn display(&self) -> &FrameReceiver {
        &self.display
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    /// True while frames are still being delivered.
    pub fn is_playing(&self) -> bool {
        !self.finished.load(Ordering::SeqCst) && !self.shutdown.load(Ordering::SeqCst)
    }

    /// Block until the source runs dry or `timeout` elapses.
    pub fn wait_finished(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.finished.load(Ordering::SeqCst) {
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        true
    }

    pub fn stop(mut self) -> Result<()> {
        self.shutdown_and_join()
    }

    fn shutdown_and_join(&mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("live stream thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for LiveStream {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown_and_join() {
            log::error!("{}", err);
        }
    }
}
