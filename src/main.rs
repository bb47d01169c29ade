use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use face_enroll::api::{create_router, AppState};
use face_enroll::capture::SyntheticCamera;
use face_enroll::config::AppConfig;
use face_enroll::flow::{FaceMatchFlow, FieldName, RegistrationFlow, SEARCH_LABEL};
use face_enroll::registration::{MatchOutcome, RegistrationForm};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal::ctrl_c;
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Frame size used when no photo file is given.
const SYNTHETIC_FRAME: (u32, u32) = (1280, 720);

#[derive(Parser, Debug)]
#[clap(about = "Photo-backed user registration with face matching")]
struct Args {
    #[clap(long, default_value = "config.toml")]
    config: PathBuf,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default)
    Serve {
        #[clap(long)]
        bind: Option<String>,
    },
    /// Register a user from the command line
    Enroll {
        #[clap(long)]
        name: String,
        #[clap(long)]
        mobile: String,
        #[clap(long)]
        gender: String,
        #[clap(long)]
        national_id: String,
        /// JPEG/PNG to upload; a synthetic camera frame is used when omitted
        #[clap(long)]
        photo: Option<PathBuf>,
    },
    /// Look up a registered user by photo
    Match {
        #[clap(long)]
        photo: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let cfg = AppConfig::load(&args.config).context("load config")?;

    match args.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => serve(cfg, bind).await,
        Command::Enroll {
            name,
            mobile,
            gender,
            national_id,
            photo,
        } => {
            let form = RegistrationForm {
                name: Some(name),
                mobile: Some(mobile),
                gender: Some(gender),
                national_id: Some(national_id),
                photo_reference: None,
            };
            enroll(cfg, form, photo).await
        }
        Command::Match { photo } => find_match(cfg, photo).await,
    }
}

async fn serve(cfg: AppConfig, bind: Option<String>) -> anyhow::Result<()> {
    let bind_addr = bind.unwrap_or_else(|| cfg.bind_addr.clone());
    let state = AppState::connect(&cfg).context("connect storage")?;
    let app = create_router(state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("bind {}", bind_addr))?;
    info!(
        "Listening on {} (bucket {}, AI server {})",
        bind_addr, cfg.registration.bucket_name, cfg.matcher.base_url
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve")?;

    info!("Server shut down");
    Ok(())
}

fn synthetic_camera() -> Arc<SyntheticCamera> {
    let (width, height) = SYNTHETIC_FRAME;
    Arc::new(SyntheticCamera::new(width, height))
}

async fn enroll(
    cfg: AppConfig,
    mut form: RegistrationForm,
    photo: Option<PathBuf>,
) -> anyhow::Result<()> {
    let state = AppState::connect(&cfg).context("connect storage")?;

    let receipt = match photo {
        Some(path) => {
            let data = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "photo.jpg".to_string());
            let label = form.name.clone().unwrap_or_default();
            let destination = state.images.try_upload(data, &file_name, &label).await?;
            form.photo_reference = Some(destination);
            state.submission.submit(&form).await?
        }
        None => {
            warn!("No photo given, capturing a synthetic frame");
            let mut flow = RegistrationFlow::new(
                synthetic_camera(),
                state.images.clone(),
                state.submission.clone(),
            );
            let values = [
                (FieldName::Name, form.name.take()),
                (FieldName::Mobile, form.mobile.take()),
                (FieldName::Gender, form.gender.take()),
                (FieldName::NationalId, form.national_id.take()),
            ];
            for (field, value) in values {
                flow.set_field(field, value.unwrap_or_default())?;
            }
            flow.start_camera().await?;
            flow.capture_photo().await?;
            let (receipt, notice) = flow.submit().await?;
            info!("{}", notice.message());
            receipt
        }
    };

    println!("{}", serde_json::to_string_pretty(&receipt)?);
    Ok(())
}

async fn find_match(cfg: AppConfig, photo: Option<PathBuf>) -> anyhow::Result<()> {
    let state = AppState::connect(&cfg).context("connect storage")?;

    match photo {
        Some(path) => {
            let data = fs::read(&path).with_context(|| format!("read {}", path.display()))?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "search.jpg".to_string());
            let destination = state.images.try_upload(data, &file_name, SEARCH_LABEL).await?;

            match state.orchestrator.find_match(&destination).await? {
                MatchOutcome::Matched { user, preview } => {
                    println!("{}", serde_json::to_string_pretty(&user)?);
                    println!("preview: {}", preview.url);
                }
                MatchOutcome::NotMatched { message } => bail!(message),
            }
        }
        None => {
            warn!("No photo given, capturing a synthetic frame");
            let mut flow = FaceMatchFlow::new(
                synthetic_camera(),
                state.images.clone(),
                state.orchestrator.clone(),
            );
            flow.start_camera().await?;
            flow.capture_photo().await?;
            let notice = flow.submit().await?;
            info!("{}", notice.message());

            match flow.matched() {
                Some(user) => println!("{}", serde_json::to_string_pretty(user)?),
                None => bail!(notice.message().to_string()),
            }
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
