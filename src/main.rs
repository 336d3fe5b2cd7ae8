use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use voice_agent::audio::{AudioSource, CaptureConfig, WavCapture};
use voice_agent::config::{AudioSourceKind, Config, SignalBackend};
use voice_agent::mapper::{Catalog, IntentSlot, Mapper};
use voice_agent::nlu::{NluEngines, RasaClient, SnipsClient};
use voice_agent::session::{ServiceStatus, SessionHandler};
use voice_agent::stt::NatsTranscriber;
use voice_agent::vehicle::{CommandExecutor, InMemorySignals, NatsSignalClient, SignalClient};
use voice_agent::{create_router, AppState, NatsClient};

#[derive(Parser)]
#[command(name = "voice-agent", version, about = "Voice command service for vehicle signals")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the voice agent service
    RunServer {
        /// Config file, without or with the .toml extension
        #[arg(long, default_value = "config/voice-agent")]
        config: String,

        #[arg(long)]
        intents_vss_map_path: Option<PathBuf>,

        #[arg(long)]
        vss_signals_spec_path: Option<PathBuf>,

        /// Directory for recorded voice commands
        #[arg(long)]
        audio_store_dir: Option<PathBuf>,
    },

    /// Validate the intent map and signal specifications
    CheckCatalog {
        #[arg(long)]
        intents_vss_map_path: PathBuf,

        #[arg(long)]
        vss_signals_spec_path: PathBuf,
    },

    /// Print the execution plan for an intent as JSON
    MapIntent {
        #[arg(long)]
        intents_vss_map_path: PathBuf,

        #[arg(long)]
        vss_signals_spec_path: PathBuf,

        #[arg(long)]
        intent: String,

        /// Slot as name=value, may be repeated
        #[arg(long = "slot", value_parser = parse_slot)]
        slots: Vec<IntentSlot>,
    },
}

fn parse_slot(s: &str) -> Result<IntentSlot, String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok(IntentSlot::new(name, value)),
        _ => Err(format!("expected name=value, got '{}'", s)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Command::RunServer {
            config,
            intents_vss_map_path,
            vss_signals_spec_path,
            audio_store_dir,
        } => {
            let mut cfg = Config::load(&config)?;
            if let Some(path) = intents_vss_map_path {
                cfg.mapper.intents_vss_map_path = path;
            }
            if let Some(path) = vss_signals_spec_path {
                cfg.mapper.vss_signals_spec_path = path;
            }
            if let Some(dir) = audio_store_dir {
                cfg.audio.recordings_path = dir;
            }
            run_server(cfg).await
        }
        Command::CheckCatalog {
            intents_vss_map_path,
            vss_signals_spec_path,
        } => {
            let catalog = Catalog::load(&intents_vss_map_path, &vss_signals_spec_path)?;
            println!(
                "Catalog OK: {} intents, {} signals",
                catalog.intent_count(),
                catalog.signal_count()
            );
            Ok(())
        }
        Command::MapIntent {
            intents_vss_map_path,
            vss_signals_spec_path,
            intent,
            slots,
        } => {
            let catalog = Catalog::load(&intents_vss_map_path, &vss_signals_spec_path)?;
            let mapper = Mapper::new(Arc::new(catalog));
            let plan = mapper.parse_intent(&intent, &slots, "cli");
            println!("{}", serde_json::to_string_pretty(&plan)?);
            Ok(())
        }
    }
}

async fn run_server(cfg: Config) -> Result<()> {
    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    // A malformed catalog aborts startup
    let catalog = Catalog::load(&cfg.mapper.intents_vss_map_path, &cfg.mapper.vss_signals_spec_path)
        .context("Failed to load signal catalog")?;
    let mapper = Mapper::new(Arc::new(catalog));

    let nats = Arc::new(NatsClient::connect(&cfg.nats.url).await?);

    let source = match cfg.audio.source {
        AudioSourceKind::Nats => AudioSource::Nats {
            client: nats.inner().clone(),
            subject: cfg.audio.source_subject.clone(),
        },
        AudioSourceKind::File => match &cfg.audio.source_file {
            Some(path) => AudioSource::File(path.clone()),
            None => bail!("audio.source = \"file\" requires audio.source_file"),
        },
    };

    let capture = WavCapture::new(CaptureConfig {
        recordings_path: cfg.audio.recordings_path.clone(),
        sample_rate: cfg.audio.sample_rate,
        channels: cfg.audio.channels,
        source,
    })
    .with_context(|| format!("Failed to prepare {}", cfg.audio.recordings_path.display()))?;

    let transcriber = NatsTranscriber::new(
        Arc::clone(&nats),
        Duration::from_secs(cfg.nats.stt_timeout_secs),
    );

    let nlu_timeout = Duration::from_secs(cfg.nlu.timeout_secs);
    let mut engines = NluEngines::new();
    if cfg.nlu.snips_enabled {
        engines = engines.with_snips(Arc::new(SnipsClient::new(
            Arc::clone(&nats),
            cfg.nlu.snips_subject.clone(),
            nlu_timeout,
        )));
    }
    if cfg.nlu.rasa_enabled {
        let rasa = RasaClient::new(&cfg.nlu.rasa_url, nlu_timeout)?;
        if !rasa.is_running().await {
            warn!("Rasa server at {} is not answering yet", cfg.nlu.rasa_url);
        }
        engines = engines.with_rasa(Arc::new(rasa));
    }

    let signals: Arc<dyn SignalClient> = match cfg.kuksa.backend {
        SignalBackend::Nats => Arc::new(NatsSignalClient::new(
            Arc::clone(&nats),
            cfg.kuksa.subject_prefix.clone(),
            Duration::from_secs(cfg.kuksa.timeout_secs),
        )),
        SignalBackend::Memory => {
            warn!("Using in-memory vehicle signals, commands will not reach the vehicle");
            Arc::new(InMemorySignals::new())
        }
    };

    let handler = Arc::new(SessionHandler::new(
        Arc::new(capture),
        Arc::new(transcriber),
        engines,
        cfg.session.store_voice_commands,
    ));
    let _sweeper = handler.spawn_sweeper(
        Duration::from_secs(cfg.session.sweep_interval_secs),
        Duration::from_secs(cfg.session.max_age_secs),
    );

    let executor = Arc::new(CommandExecutor::new(mapper, signals, cfg.kuksa.retry_attempts));
    let state = AppState::new(handler, executor, ServiceStatus::new(&cfg.service.wake_word));

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")
}
