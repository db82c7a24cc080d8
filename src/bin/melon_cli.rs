//! melon_cli - still-image detection and history management

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use melon_leaf::detect::backends::load_engine;
use melon_leaf::{
    AppConfig, Annotator, HistoryStore, ModelHandle, RegisterOutcome, SaveStatus, Session,
    SqliteStore, StillImagePipeline, Threshold,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the history database. Overrides config.
    #[arg(long, env = "MELON_DB_PATH")]
    db_path: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account.
    Register {
        #[arg(long)]
        username: String,
        #[arg(long, env = "MELON_PASSWORD")]
        password: String,
    },
    /// Detect diseases on an image and save the result to history.
    Detect {
        #[arg(long)]
        username: String,
        #[arg(long, env = "MELON_PASSWORD")]
        password: String,
        /// PNG or JPEG leaf photo.
        image: PathBuf,
        /// Confidence threshold in (0, 1].
        #[arg(long)]
        threshold: Option<f32>,
        /// Write the annotated image here.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// List a user's detections, most recent first.
    History {
        #[arg(long)]
        username: String,
        #[arg(long, env = "MELON_PASSWORD")]
        password: String,
        /// Print records as JSON lines.
        #[arg(long)]
        json: bool,
    },
    /// Delete one of a user's detections.
    Delete {
        #[arg(long)]
        username: String,
        #[arg(long, env = "MELON_PASSWORD")]
        password: String,
        id: i64,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = AppConfig::load()?;
    if let Some(db_path) = args.db_path {
        cfg.db_path = db_path;
    }
    let store = SqliteStore::open(&cfg.db_path, cfg.timezone_offset_hours)?;
    let default_threshold = Threshold::new(cfg.upload.default_threshold)?;
    let mut session = Session::new(store, default_threshold);

    match args.command {
        Command::Register { username, password } => {
            let outcome = session.register(&username, &password, &password)?;
            println!("{}", outcome.message());
            if outcome != RegisterOutcome::Registered {
                return Err(anyhow!("registration failed"));
            }
        }
        Command::Detect {
            username,
            password,
            image,
            threshold,
            output,
        } => {
            sign_in(&mut session, &username, &password)?;
            if let Some(value) = threshold {
                session.set_upload_threshold(Threshold::new(value)?);
            }
            let model_settings = cfg.model.clone();
            let model = Arc::new(ModelHandle::new(move || load_engine(&model_settings)));
            let annotator = Annotator::from_font_path(cfg.font_path.as_deref());
            let pipeline = StillImagePipeline::new(model, annotator, cfg.upload.clone());

            let bytes = std::fs::read(&image)
                .map_err(|e| anyhow!("failed to read {}: {}", image.display(), e))?;
            let outcome = session.submit_upload(&pipeline, &bytes).map_err(|e| {
                log::error!("{}", e);
                anyhow!(e.user_message())
            })?;
            let result = session
                .upload()
                .result()
                .ok_or_else(|| anyhow!("no detection result"))?;

            println!("Ringkasan: {}", result.summary_text);
            let verdict = pipeline.verdict(result);
            println!("{}", verdict.headline());
            if let Some(warning) = verdict.warning() {
                println!("{}", warning);
            }
            println!("Kepercayaan Tertinggi: {:.2}", result.highest_confidence);
            match outcome.save {
                SaveStatus::Saved(id) => println!("Deteksi berhasil disimpan ke riwayat! (id {})", id),
                SaveStatus::AlreadySaved | SaveStatus::SkippedEmpty => {}
                SaveStatus::Failed(err) => eprintln!("{}", err.user_message()),
            }
            if let Some(path) = output {
                result.annotated.save(&path)?;
                log::info!("annotated image written to {}", path.display());
            }
        }
        Command::History {
            username,
            password,
            json,
        } => {
            sign_in(&mut session, &username, &password)?;
            let records = session.history()?;
            if records.is_empty() {
                println!("Anda belum memiliki riwayat deteksi.");
            }
            for record in records {
                if json {
                    println!("{}", serde_json::to_string(&record)?);
                } else {
                    println!(
                        "[{}] Waktu: {} | Penyakit: {} | Kepercayaan: {:.2}",
                        record.id, record.timestamp, record.disease_name, record.confidence
                    );
                }
            }
        }
        Command::Delete {
            username,
            password,
            id,
        } => {
            sign_in(&mut session, &username, &password)?;
            if session.delete_record(id).map_err(|e| anyhow!(e.user_message()))? {
                println!("Catatan riwayat berhasil dihapus.");
            } else {
                return Err(anyhow!("Gagal menghapus catatan riwayat."));
            }
        }
    }
    Ok(())
}

fn sign_in<S>(session: &mut Session<S>, username: &str, password: &str) -> Result<()>
where
    S: HistoryStore + melon_leaf::UserStore,
{
    if session.login(username, password)? {
        Ok(())
    } else {
        Err(anyhow!(melon_leaf::session::LOGIN_FAILED))
    }
}
