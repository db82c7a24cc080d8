//! melond - live melon leaf annotation daemon
//!
//! Streams frames from the configured source through the live processor,
//! polls the summary queue the way a UI would, and logs each new summary.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use melon_leaf::detect::backends::load_engine;
use melon_leaf::{AppConfig, Annotator, LiveStream, ModelHandle};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Frame source (stub://... or a directory of images). Overrides config.
    #[arg(long)]
    source: Option<String>,
    /// How often the summary queue is polled, in milliseconds.
    #[arg(long, default_value_t = 250)]
    poll_ms: u64,
    /// Write the last displayed frame here on shutdown.
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = AppConfig::load()?;
    if let Some(source) = args.source {
        cfg.live.source = source;
    }

    let model_settings = cfg.model.clone();
    let model = Arc::new(ModelHandle::new(move || load_engine(&model_settings)));
    // Load eagerly so a broken model is reported before the stream starts.
    if let Err(err) = model.get() {
        log::error!("{}", err.user_message());
        return Err(err.into());
    }

    let annotator = Annotator::from_font_path(cfg.font_path.as_deref());
    let (stream, summaries) = LiveStream::start(&cfg.live, model, annotator)?;
    log::info!(
        "melond running: source={} interval={} size={} confidence={:.2}",
        cfg.live.source,
        cfg.live.process_interval,
        cfg.live.inference_size,
        cfg.live.confidence
    );

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = running.clone();
    ctrlc::set_handler(move || handler_flag.store(false, Ordering::SeqCst))
        .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let poll = Duration::from_millis(args.poll_ms.max(1));
    while running.load(Ordering::SeqCst) {
        if let Some(summary) = summaries.latest() {
            log::info!("{}", serde_json::to_string(&summary)?);
        }
        if !stream.is_playing() && summaries.pending() == 0 {
            log::info!("frame source finished");
            break;
        }
        std::thread::sleep(poll);
    }
    if let Some(summary) = summaries.latest() {
        log::info!("{}", serde_json::to_string(&summary)?);
    }

    let stats = stream.stats();
    log::info!(
        "frames={} inference_ticks={} failed_ticks={} rejected={} dropped_summaries={}",
        stats.frames_delivered(),
        stats.inference_ticks(),
        stats.failed_ticks(),
        stats.frames_rejected(),
        summaries.dropped()
    );
    if let Some(path) = &args.snapshot {
        match stream.display().latest() {
            Some(frame) => {
                frame.save(path)?;
                log::info!("last frame written to {}", path.display());
            }
            None => log::warn!("no frame was displayed, snapshot skipped"),
        }
    }
    stream.stop()?;
    Ok(())
}
