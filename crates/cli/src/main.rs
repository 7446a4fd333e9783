use clap::{Parser, Subcommand};
use relay::channels::{ChannelRegistry, InboundMessage, ShellChannel};
use relay::config::{Config, RelaySettings};
use relay::trigger::TriggerMatcher;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "Chat relay CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config file.
    Init {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Resolve config and environment and print what the relay would run with.
    Check {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Run the gateway: accepts messages on POST /messages and relays them to the backend.
    Gateway {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// HTTP port (default from config or 15152)
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Relay lines typed on stdin as chat messages; replies are printed to stdout.
    Shell {
        /// Config file path (default: RELAY_CONFIG_PATH or ~/.relay/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Sender id for typed messages.
        #[arg(long, default_value = "shell")]
        sender: String,

        /// Room id for typed messages.
        #[arg(long, default_value = "shell")]
        room: String,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("relay {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Check { config }) => {
            if let Err(e) = run_check(config) {
                log::error!("check failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Gateway { config, port }) => {
            if let Err(e) = run_gateway(config, port).await {
                log::error!("gateway failed: {}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Shell {
            config,
            sender,
            room,
        }) => {
            if let Err(e) = run_shell(config, sender, room).await {
                log::error!("shell failed: {}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(relay::config::default_config_path);
    let dir = relay::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

fn run_check(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, path) = relay::config::load_config(config_path)?;
    let settings = RelaySettings::resolve(&config.relay);
    println!("config: {}", path.display());
    match settings.require_backend_url() {
        Ok(url) => println!("backend: {}", url),
        Err(e) => println!("backend: {} (relay disabled)", e),
    }
    println!(
        "api key: {}",
        if settings.api_key.is_some() { "set" } else { "not set" }
    );
    let trigger = TriggerMatcher::from_config(settings.start_pattern.as_deref());
    if trigger.is_default() && settings.start_pattern.is_some() {
        println!("trigger: {:?} (configured pattern rejected)", trigger.as_str());
    } else {
        println!("trigger: {:?}", trigger.as_str());
    }
    println!("ignored senders: {}", settings.ignored_sender_ids.len());
    println!("bot names: {}", settings.bot_names.join(", "));
    println!("serialize rooms: {}", settings.serialize_rooms);
    match relay::config::resolve_brain_path(&settings, &path) {
        Some(p) => println!("brain: {}", p.display()),
        None => println!("brain: in-memory"),
    }
    Ok(())
}

async fn run_gateway(config_path: Option<PathBuf>, port: Option<u16>) -> anyhow::Result<()> {
    let (mut config, path) = relay::config::load_config(config_path)?;
    if let Some(p) = port {
        config.gateway.port = p;
    }
    log::info!("starting gateway on {}:{}", config.gateway.bind, config.gateway.port);
    relay::gateway::run_gateway(config, path).await
}

async fn run_shell(config_path: Option<PathBuf>, sender: String, room: String) -> anyhow::Result<()> {
    let (config, path): (Config, PathBuf) = relay::config::load_config(config_path)?;
    let settings = RelaySettings::resolve(&config.relay);
    let brain_path = relay::config::resolve_brain_path(&settings, &path);
    let brain = relay::brain::open_brain(brain_path.as_deref());
    let dispatcher = Arc::new(relay::router::build_dispatcher(&settings, brain));

    let channels = Arc::new(ChannelRegistry::new());
    let shell = Arc::new(ShellChannel::new(sender, room));
    channels.register(shell.clone()).await;

    let (inbound_tx, inbound_rx) = tokio::sync::mpsc::channel::<InboundMessage>(16);
    let processor = relay::processor::spawn_processor(
        dispatcher,
        channels,
        settings.serialize_rooms,
        inbound_rx,
    );
    let input = shell.start_inbound(inbound_tx);
    input.await?;
    processor.await?;
    Ok(())
}
