use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;

use facewatch_core::config::SupervisorConfig;
use facewatch_core::detection::domain::face_classifier::FaceClassifier;
use facewatch_core::detection::infrastructure::model_resolver;
use facewatch_core::detection::infrastructure::pico_cascade::PicoCascade;
use facewatch_core::frames::infrastructure::file_frame_store::FileFrameStore;
use facewatch_core::process::infrastructure::child_process::ChildProcessLauncher;
use facewatch_core::registry::alert_dispatcher::AlertDispatcher;
use facewatch_core::registry::infrastructure::http_registry_client::HttpRegistryClient;
use facewatch_core::shared::constants::CASCADE_MODEL_NAME;
use facewatch_core::supervision::cancellation::CancellationToken;
use facewatch_core::supervision::pipeline_commands::PipelineCommands;
use facewatch_core::supervision::pipeline_supervisor::PipelineSupervisor;
use facewatch_core::supervision::reconciler::Reconciler;

/// Keeps a re-stream and face detection running for every registered camera.
#[derive(Parser, Debug)]
#[command(name = "facewatch")]
struct Cli {
    /// JSON config file; command-line flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Base URL of the camera registry.
    #[arg(long)]
    registry_url: Option<String>,

    /// RTSP server the re-streams are published to.
    #[arg(long)]
    media_server_url: Option<String>,

    /// ffmpeg executable.
    #[arg(long)]
    ffmpeg: Option<String>,

    /// Directory for sampled frames.
    #[arg(long)]
    frames_dir: Option<PathBuf>,

    /// Directory the cascade model is cached in.
    #[arg(long)]
    cascade_dir: Option<PathBuf>,

    /// Seconds between registry polls.
    #[arg(long)]
    poll_interval: Option<u64>,
}

impl Cli {
    fn into_config(self) -> Result<SupervisorConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => SupervisorConfig::load(path)?,
            None => SupervisorConfig::default(),
        };
        if let Some(url) = self.registry_url {
            config.registry_url = url;
        }
        if let Some(url) = self.media_server_url {
            config.media_server_url = url;
        }
        if let Some(ffmpeg) = self.ffmpeg {
            config.ffmpeg_path = ffmpeg;
        }
        if let Some(dir) = self.frames_dir {
            config.frames_dir = dir;
        }
        if let Some(dir) = self.cascade_dir {
            config.cascade_dir = Some(dir);
        }
        if let Some(secs) = self.poll_interval {
            config.poll_interval_secs = secs;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Cli::parse().into_config()?;

    fs::create_dir_all(&config.frames_dir)
        .map_err(|e| format!("Cannot create {}: {e}", config.frames_dir.display()))?;
    let classifier = build_classifier(&config)?;

    let registry = Arc::new(HttpRegistryClient::new(
        &config.registry_url,
        config.request_timeout(),
    )?);
    let supervisor = Arc::new(PipelineSupervisor::new(
        Arc::new(ChildProcessLauncher::new()),
        PipelineCommands::new(config.ffmpeg_path.as_str(), &config.media_server_url),
        Arc::new(FileFrameStore::new(config.frames_dir.clone())),
        classifier,
        AlertDispatcher::new(registry.clone()),
        config.detection_settings(),
    ));
    let reconciler = Reconciler::new(registry, supervisor.clone(), config.poll_interval());

    let shutdown = CancellationToken::new();
    install_shutdown_handler(&shutdown)?;

    log::info!(
        "Supervising cameras from {} (publishing to {})",
        config.registry_url,
        config.media_server_url
    );
    reconciler.run(&shutdown);

    let stopped = supervisor.stop_all();
    log::info!("Stopped {stopped} pipeline(s)");
    Ok(())
}

/// Cancels `shutdown` on SIGINT, SIGTERM or SIGHUP.
fn install_shutdown_handler(shutdown: &CancellationToken) -> Result<(), ctrlc::Error> {
    let shutdown = shutdown.clone();
    ctrlc::set_handler(move || {
        log::info!("Shutdown signal received, stopping pipelines");
        shutdown.cancel();
    })
}

fn build_classifier(
    config: &SupervisorConfig,
) -> Result<Arc<dyn FaceClassifier>, Box<dyn std::error::Error>> {
    log::info!("Resolving cascade: {CASCADE_MODEL_NAME}");
    let cache_dir = config.cascade_dir()?;
    let cascade_path = model_resolver::resolve(
        CASCADE_MODEL_NAME,
        &config.cascade_url,
        &cache_dir,
        Some(Box::new(download_progress)),
    )?;

    let cascade = PicoCascade::from_file(&cascade_path)?;
    log::info!(
        "Loaded cascade {} ({} trees, depth {})",
        cascade_path.display(),
        cascade.tree_count(),
        cascade.tree_depth()
    );
    Ok(Arc::new(cascade))
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face cascade... {pct}%");
        if downloaded >= total {
            eprintln!();
        }
    } else {
        eprint!("\rDownloading face cascade... {downloaded} bytes");
    }
}
