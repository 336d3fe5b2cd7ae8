use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Service configuration.
///
/// Loaded from a TOML file; any key can be overridden through the
/// environment as `VOICE_AGENT__<SECTION>__<KEY>`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioConfig,
    pub mapper: MapperConfig,
    pub nlu: NluConfig,
    pub nats: NatsConfig,
    pub kuksa: KuksaConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub wake_word: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "voice-agent".to_string(),
            wake_word: "hello auto".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 51053,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioSourceKind {
    Nats,
    File,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Directory receiving recorded voice commands
    pub recordings_path: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
    pub source: AudioSourceKind,
    /// Subject carrying microphone frames when `source = "nats"`
    pub source_subject: String,
    /// WAV file replayed when `source = "file"`
    pub source_file: Option<PathBuf>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            recordings_path: PathBuf::from("/tmp/voice-agent/audio"),
            sample_rate: 16000,
            channels: 1,
            source: AudioSourceKind::Nats,
            source_subject: "audio.mic.frames".to_string(),
            source_file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    pub intents_vss_map_path: PathBuf,
    pub vss_signals_spec_path: PathBuf,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            intents_vss_map_path: PathBuf::from("config/intents_vss_map.json"),
            vss_signals_spec_path: PathBuf::from("config/vss_signals_spec.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NluConfig {
    pub snips_enabled: bool,
    pub snips_subject: String,
    pub rasa_enabled: bool,
    pub rasa_url: String,
    pub timeout_secs: u64,
}

impl Default for NluConfig {
    fn default() -> Self {
        Self {
            snips_enabled: true,
            snips_subject: "nlu.snips.parse".to_string(),
            rasa_enabled: true,
            rasa_url: "http://127.0.0.1:51054".to_string(),
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    pub url: String,
    pub stt_timeout_secs: u64,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            stt_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalBackend {
    Nats,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KuksaConfig {
    pub backend: SignalBackend,
    /// Request subjects are `<prefix>.set` and `<prefix>.get`
    pub subject_prefix: String,
    pub retry_attempts: u32,
    pub timeout_secs: u64,
}

impl Default for KuksaConfig {
    fn default() -> Self {
        Self {
            backend: SignalBackend::Nats,
            subject_prefix: "kuksa.val".to_string(),
            retry_attempts: 3,
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub store_voice_commands: bool,
    pub sweep_interval_secs: u64,
    pub max_age_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store_voice_commands: false,
            sweep_interval_secs: 30,
            max_age_secs: 300,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("VOICE_AGENT")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to read config {}", path))?;

        let cfg: Self = settings
            .try_deserialize()
            .with_context(|| format!("Invalid config {}", path))?;

        if cfg.session.sweep_interval_secs == 0 {
            bail!("Invalid config {}: session.sweep_interval_secs must be non-zero", path);
        }

        Ok(cfg)
    }
}
