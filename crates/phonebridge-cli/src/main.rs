use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use phonebridge_core::config::{Config, LoggingConfig};
use phonebridge_gateway::markup::{SayOptions, build_stream_markup_with};
use phonebridge_gateway::{GatewayState, default_collaborators, start_gateway};

#[derive(Parser)]
#[command(
    name = "phonebridge",
    about = "Telephony media-stream voice assistant: speech in, conversational speech out",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Port to listen on (default: 10000)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Print the call-control markup that opens a media stream
    Markup {
        /// WebSocket URL the platform should stream audio to
        #[arg(long)]
        stream_url: String,

        /// Greeting spoken before the stream opens
        #[arg(long)]
        greeting: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show system status
    Status,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Get a specific config value (dotted path, e.g. "assistant.pause_ms")
    Get { key: String },
    /// Check the configuration for problems
    Validate,
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn init_logging(verbose: bool, logging: Option<&LoggingConfig>) {
    let mut directives = if verbose {
        "debug".to_string()
    } else {
        logging
            .and_then(|l| l.level.clone())
            .unwrap_or_else(|| "info".to_string())
    };
    for extra in logging.map(|l| l.filters.as_slice()).unwrap_or_default() {
        directives.push(',');
        directives.push_str(extra);
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(directives));
    let json = logging.is_some_and(|l| l.format == "json");
    let stdout = logging.is_some_and(|l| l.output == "stdout");

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match (json, stdout) {
        (true, true) => builder.json().with_writer(std::io::stdout).init(),
        (true, false) => builder.json().with_writer(std::io::stderr).init(),
        (false, true) => builder.with_writer(std::io::stdout).init(),
        (false, false) => builder.with_writer(std::io::stderr).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .map(PathBuf::from)
        .unwrap_or_else(Config::config_path);
    let config = Config::load(&config_path)?;

    init_logging(cli.verbose, config.logging.as_ref());

    match cli.command {
        Commands::Serve { port } => {
            let (warnings, errors) = config.validate();
            for w in &warnings {
                tracing::warn!("{w}");
            }
            if !errors.is_empty() {
                for e in &errors {
                    tracing::error!("{e}");
                }
                anyhow::bail!("invalid configuration ({} errors)", errors.len());
            }

            let port = port.unwrap_or_else(|| config.gateway_port());
            tracing::info!("Starting PhoneBridge gateway on port {port}");

            let collaborators = default_collaborators(&config);
            let state = GatewayState::new(config, collaborators);
            #[cfg(feature = "metrics")]
            let state = match phonebridge_gateway::metrics::install_prometheus_recorder() {
                Ok(handle) => state.with_metrics(handle),
                Err(e) => {
                    tracing::warn!(%e, "Prometheus recorder unavailable");
                    state
                }
            };

            start_gateway(Arc::new(state), port).await?;
        }
        Commands::Markup {
            stream_url,
            greeting,
        } => {
            let assistant = config.assistant();
            let say = SayOptions {
                voice: assistant.say_voice,
                language: assistant.say_language,
            };
            let greeting = greeting.or(assistant.markup_greeting);
            println!(
                "{}",
                build_stream_markup_with(&stream_url, greeting.as_deref(), &say)
            );
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let json = serde_json::to_string_pretty(&config)?;
                println!("{json}");
            }
            ConfigAction::Get { key } => match config.get_path(&key) {
                Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
                None => anyhow::bail!("no config value at '{key}'"),
            },
            ConfigAction::Validate => {
                let (warnings, errors) = config.validate();
                for w in &warnings {
                    println!("warning: {w}");
                }
                for e in &errors {
                    println!("error: {e}");
                }
                if !errors.is_empty() {
                    anyhow::bail!("configuration has {} errors", errors.len());
                }
                println!("Configuration OK ({})", config_path.display());
            }
            ConfigAction::Init { force } => {
                if config_path.exists() && !force {
                    anyhow::bail!(
                        "{} already exists (use --force to overwrite)",
                        config_path.display()
                    );
                }
                if let Some(parent) = config_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                Config::default().save(&config_path)?;
                println!("Wrote default configuration to {}", config_path.display());
            }
        },
        Commands::Status => {
            let port = config.gateway_port();
            let yes_no = |b: bool| if b { "configured" } else { "missing" };
            println!("PhoneBridge v{}", env!("CARGO_PKG_VERSION"));
            println!("Config: {}", config_path.display());
            println!("Gateway port: {port}");
            println!("Media stream path: {}", config.stream_path());
            if let Some(url) = config.gateway.as_ref().and_then(|g| g.public_url.as_deref()) {
                println!("Public URL: {url}");
            }
            println!("Pause: {} ms", config.pause().as_millis());
            println!("Chat model: {}", config.chat_model());
            println!("Voice: {}", config.voice_id());
            let session = config.session_config();
            println!("OpenAI key: {}", yes_no(!session.chat_api_key.is_empty()));
            println!("TTS key: {}", yes_no(!session.tts_api_key.is_empty()));

            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(2))
                .build()?;
            match client
                .get(format!("http://127.0.0.1:{port}/health"))
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => {
                    let health: serde_json::Value = resp.json().await?;
                    println!(
                        "Status: running ({} active calls, {} connections)",
                        health["active_calls"], health["connections"]
                    );
                }
                _ => println!("Status: not running"),
            }
        }
    }

    Ok(())
}
