//! voice-input - Streaming speech recognition client

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use voice_input::audio::{FileSource, SourceConfig, DEFAULT_CHUNK_BYTES};
use voice_input::config::{
    config_path, load_config_from, mask_secret, save_config_to, ConfigError, CredentialProvider,
    CredentialSet, FileCredentialProvider, ModelType, StaticCredentialProvider,
};
use voice_input::network::{
    probe, SessionConfig, SessionEvent, SessionState, TextSink, WsConnector,
    PROBE_TIMEOUT,
};
use voice_input::Recognizer;

#[derive(Parser)]
#[command(name = "voice-input")]
#[command(about = "Streaming speech recognition client")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or edit the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Check which endpoints accept a connection
    Probe {
        #[command(flatten)]
        credentials: CredentialOverrides,

        /// Timeout per endpoint in milliseconds
        #[arg(long, default_value_t = PROBE_TIMEOUT.as_millis() as u64)]
        timeout_ms: u64,
    },

    /// Stream a pre-encoded audio file and print the transcript
    Transcribe {
        /// Encoded audio file (16 kHz mono Opus)
        file: PathBuf,

        /// Bytes per chunk, sent every 250ms
        #[arg(long, default_value_t = DEFAULT_CHUNK_BYTES)]
        chunk_bytes: usize,

        #[command(flatten)]
        credentials: CredentialOverrides,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the configuration with secrets masked
    Show,

    /// Update and save the configuration
    Set {
        #[arg(long)]
        access_key_id: Option<String>,

        #[arg(long)]
        access_key_secret: Option<String>,

        #[arg(long)]
        app_id: Option<String>,

        #[arg(long)]
        access_token: Option<String>,

        #[arg(long, value_enum)]
        model_type: Option<ModelArg>,

        /// Custom endpoint URL (empty string to clear)
        #[arg(long)]
        endpoint: Option<String>,

        /// Recognition language, e.g. zh-CN
        #[arg(long)]
        language: Option<String>,
    },

    /// Print the config file location
    Path,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModelArg {
    Standard,
    Custom,
}

impl From<ModelArg> for ModelType {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::Standard => ModelType::Standard,
            ModelArg::Custom => ModelType::Custom,
        }
    }
}

/// Credential fields that override the config file for one run
#[derive(Args)]
struct CredentialOverrides {
    #[arg(long, env = "VOICE_INPUT_ACCESS_KEY_ID")]
    access_key_id: Option<String>,

    #[arg(long, env = "VOICE_INPUT_ACCESS_KEY_SECRET", hide_env_values = true)]
    access_key_secret: Option<String>,

    #[arg(long, env = "VOICE_INPUT_APP_ID")]
    app_id: Option<String>,

    #[arg(long, env = "VOICE_INPUT_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    #[arg(long, env = "VOICE_INPUT_ENDPOINT")]
    endpoint: Option<String>,

    #[arg(long, value_enum)]
    model_type: Option<ModelArg>,
}

impl CredentialOverrides {
    fn is_empty(&self) -> bool {
        [
            &self.access_key_id,
            &self.access_key_secret,
            &self.app_id,
            &self.access_token,
            &self.endpoint,
        ]
        .iter()
        .all(|value| value.is_none())
            && self.model_type.is_none()
    }

    fn apply(&self, credentials: &mut CredentialSet) {
        let fields = [
            (&self.access_key_id, &mut credentials.access_key_id),
            (&self.access_key_secret, &mut credentials.access_key_secret),
            (&self.app_id, &mut credentials.app_id),
            (&self.access_token, &mut credentials.access_token),
            (&self.endpoint, &mut credentials.custom_endpoint_url),
        ];
        for (value, field) in fields {
            if let Some(value) = value {
                *field = Some(value.clone());
            }
        }
        if let Some(model_type) = self.model_type {
            credentials.model_type = model_type.into();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    // Another provider may already be installed; either way one is available
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let path = match cli.config {
        Some(path) => path,
        None => config_path().ok_or(ConfigError::NoConfigDir)?,
    };

    match cli.command {
        Commands::Config { action } => run_config(&path, action),
        Commands::Probe {
            credentials,
            timeout_ms,
        } => run_probe(&path, &credentials, Duration::from_millis(timeout_ms)).await,
        Commands::Transcribe {
            file,
            chunk_bytes,
            credentials,
        } => run_transcribe(&path, &file, chunk_bytes, &credentials).await,
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

fn run_config(path: &Path, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Path => {
            println!("{}", path.display());
        }
        ConfigAction::Show => {
            let config = load_config_from(path)?;
            let creds = &config.credentials;
            let masked = |value: Option<&str>| value.map(mask_secret).unwrap_or_else(|| "-".into());

            println!("Config file: {}", path.display());
            println!("  language:            {}", config.language);
            println!("  model_type:          {:?}", creds.model_type);
            println!("  custom_endpoint_url: {}", creds.custom_endpoint_url().unwrap_or("-"));
            println!("  access_key_id:       {}", creds.access_key_id().unwrap_or("-"));
            println!("  access_key_secret:   {}", masked(creds.access_key_secret()));
            println!("  app_id:              {}", creds.app_id().unwrap_or("-"));
            println!("  access_token:        {}", masked(creds.access_token()));
        }
        ConfigAction::Set {
            access_key_id,
            access_key_secret,
            app_id,
            access_token,
            model_type,
            endpoint,
            language,
        } => {
            let mut config = load_config_from(path)?;
            let creds = &mut config.credentials;

            let fields = [
                (access_key_id, &mut creds.access_key_id),
                (access_key_secret, &mut creds.access_key_secret),
                (app_id, &mut creds.app_id),
                (access_token, &mut creds.access_token),
                (endpoint, &mut creds.custom_endpoint_url),
            ];
            for (value, field) in fields {
                if let Some(value) = value {
                    *field = Some(value).filter(|v| !v.is_empty());
                }
            }
            if let Some(model_type) = model_type {
                creds.model_type = model_type.into();
            }
            if let Some(language) = language {
                config.language = language;
            }

            save_config_to(path, &config)?;
            println!("Saved configuration to {}", path.display());
        }
    }

    Ok(())
}

async fn run_probe(path: &Path, overrides: &CredentialOverrides, timeout: Duration) -> Result<()> {
    let mut credentials = load_config_from(path)?.credentials;
    overrides.apply(&mut credentials);

    let results = probe(&WsConnector, &credentials, timeout).await;
    if results.is_empty() {
        bail!("No endpoint configured");
    }

    for result in &results {
        match &result.outcome {
            Ok(()) => println!("  OK    {}", result.url),
            Err(e) => println!("  FAIL  {}: {}", result.url, e),
        }
    }

    if !results.iter().any(|r| r.is_reachable()) {
        bail!("No endpoint reachable");
    }
    Ok(())
}

async fn run_transcribe(
    path: &Path,
    file: &Path,
    chunk_bytes: usize,
    overrides: &CredentialOverrides,
) -> Result<()> {
    let config = load_config_from(path)?;

    // Without overrides the file is re-read on every session start
    let provider: Arc<dyn CredentialProvider> = if overrides.is_empty() {
        Arc::new(FileCredentialProvider::new(path))
    } else {
        let mut credentials = config.credentials.clone();
        overrides.apply(&mut credentials);
        Arc::new(StaticCredentialProvider(credentials))
    };

    let source = FileSource::open(
        file,
        SourceConfig {
            chunk_bytes,
            ..Default::default()
        },
    )
    .await?;
    info!(
        "Streaming {:?} in {} chunks",
        source.path(),
        source.chunk_count()
    );

    // Terminal errors come back from finish(); the rest are reported as they happen
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            if let SessionEvent::Error(e) = event {
                if !e.is_terminal() {
                    eprintln!("{}", e);
                }
            }
        }
    });

    let sink: Arc<dyn TextSink> = Arc::new(|text: &str| println!("{}", text));
    let mut recognizer = Recognizer::new(provider, Arc::new(WsConnector), sink)
        .with_config(SessionConfig::default().with_language(&config.language))
        .with_events(events_tx);

    let pipeline = recognizer.start().await?;

    // Chunks pushed before Active would be dropped
    let state = pipeline
        .link()
        .wait_for(|s| s == SessionState::Active || s.is_terminal())
        .await;
    if state != SessionState::Active {
        recognizer.wait().await?;
        bail!("Session ended before becoming active");
    }

    let (chunks, source_task) = source.spawn();
    tokio::select! {
        stats = pipeline.forward(chunks) => {
            info!("Sent {} chunks ({} dropped)", stats.forwarded, stats.dropped);
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
        }
    }
    source_task.abort();

    if let Err(e) = recognizer.finish().await {
        warn!("Session ended with error: {}", e);
        return Err(e.into());
    }
    Ok(())
}
