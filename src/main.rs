//! docbridge - MQTT to document store forwarder
//!
//! Usage:
//!   docbridge [run] [OPTIONS]
//!   docbridge bridge-config --username <USER> [OPTIONS]
//!
//! Run options:
//!   -c, --config <FILE>     Configuration file path
//!   --host <HOST>           Broker host (default: localhost)
//!   --port <PORT>           Broker port (default: 1883, 8883 with TLS)
//!   --store-uri <URI>       Document store URI (default: mongodb://localhost:27017)
//!   -l, --log-level         Log level (error, warn, info, debug, trace)
//!   -h, --help              Print help

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use tokio::sync::broadcast;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use docbridge::config::Config;
use docbridge::mosquitto::{
    MosquittoBridge, DEFAULT_CONNECTION_NAME, DEFAULT_OUTPUT, DEFAULT_REMOTE_HOST,
    DEFAULT_REMOTE_PORT,
};
use docbridge::{store, Forwarder};

/// Log level for CLI
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum LogLevel {
    /// Only errors
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages
    #[default]
    Info,
    /// Debug messages
    Debug,
    /// Trace messages (very verbose)
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }

    fn from_config(level: &str) -> Self {
        match level.to_lowercase().as_str() {
            "error" => LogLevel::Error,
            "warn" => LogLevel::Warn,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Info,
        }
    }
}

/// docbridge - MQTT to document store forwarder
#[derive(Parser, Debug)]
#[command(name = "docbridge")]
#[command(version)]
#[command(about = "Forward every MQTT message from a local broker into a document store")]
#[command(args_conflicts_with_subcommands = true)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    run: RunArgs,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, value_enum, global = true)]
    log_level: Option<LogLevel>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the forwarder (default)
    Run(RunArgs),
    /// Write the Mosquitto bridge configuration
    BridgeConfig(BridgeConfigArgs),
}

#[derive(ClapArgs, Debug, Default)]
struct RunArgs {
    /// Configuration file path (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Broker host
    #[arg(long)]
    host: Option<String>,

    /// Broker port
    #[arg(long)]
    port: Option<u16>,

    /// Document store URI
    #[arg(long)]
    store_uri: Option<String>,
}

#[derive(ClapArgs, Debug)]
struct BridgeConfigArgs {
    /// Remote MQTT server host
    #[arg(long, default_value = DEFAULT_REMOTE_HOST)]
    host: String,

    /// Remote MQTT server port
    #[arg(long, default_value_t = DEFAULT_REMOTE_PORT)]
    port: u16,

    /// Bridge connection name
    #[arg(long, default_value = DEFAULT_CONNECTION_NAME)]
    name: String,

    /// Remote username (e.g. app1@tenant1)
    #[arg(short, long)]
    username: String,

    /// Remote password
    #[arg(long, env = "DOCBRIDGE_BRIDGE_PASSWORD", hide_env_values = true)]
    password: String,

    /// Output file
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    output: PathBuf,

    /// Print the configuration instead of writing it
    #[arg(long)]
    stdout: bool,
}

fn init_logging(level: LogLevel) -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level.to_tracing_level())
        .with_target(false)
        .with_thread_ids(true)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn load_config(args: &RunArgs) -> Result<Config, docbridge::config::ConfigError> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env()?,
    };

    // CLI args override file and environment
    if let Some(host) = &args.host {
        config.broker.host = host.clone();
    }
    if let Some(port) = args.port {
        config.broker.port = Some(port);
    }
    if let Some(uri) = &args.store_uri {
        config.store.uri = uri.clone();
    }

    config.validate()?;
    Ok(config)
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        "Forwarding {} from {} into {}.{}",
        config.broker.topic_filter,
        config.broker.address(),
        config.store.database,
        config.store.collection
    );

    let store = store::open(&config.store).await?;
    let forwarder = Forwarder::new(&config, store)?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, shutting down");
            let _ = shutdown_tx.send(());
        }
    });

    forwarder.run(shutdown_rx).await?;
    Ok(())
}

fn bridge_config(args: BridgeConfigArgs) -> Result<(), Box<dyn std::error::Error>> {
    let bridge = MosquittoBridge {
        connection: args.name,
        address: args.host,
        port: args.port,
        username: args.username,
        password: args.password,
    };

    if args.stdout {
        bridge.validate()?;
        print!("{}", bridge.render());
    } else {
        bridge.write_to(&args.output)?;
        info!("Restart the broker to apply the bridge (e.g. systemctl restart mosquitto)");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let command = args.command.unwrap_or(Command::Run(args.run));

    match command {
        Command::Run(run_args) => {
            let config = match load_config(&run_args) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Error loading configuration: {}", e);
                    std::process::exit(1);
                }
            };

            // CLI overrides config, config overrides default (info)
            let log_level = args
                .log_level
                .unwrap_or_else(|| LogLevel::from_config(&config.log.level));
            init_logging(log_level)?;

            if let Some(path) = &run_args.config {
                info!("Loaded configuration from {:?}", path);
            }

            if let Err(e) = run(config).await {
                error!("{}", e);
                std::process::exit(1);
            }
        }
        Command::BridgeConfig(bridge_args) => {
            init_logging(args.log_level.unwrap_or_default())?;

            if let Err(e) = bridge_config(bridge_args) {
                error!("{}", e);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
