//! Scout
//!
//! SCL model inspection and device synchronization from the command line.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use scl_compiler::{SclCache, SclCompiler};
use scout::events::RegistryEvent;
use scout::project::{SETTINGS_FILE, Settings};
use scout::subscriptions::{Subscription, SubscriptionMode};
use scout::DeviceRegistry;
use scout_model::Node;

/// IEC 61850 SCL compiler and device synchronization engine
#[derive(Parser, Debug)]
#[command(name = "scout")]
#[command(about = "IEC 61850 SCL compiler and device synchronization engine", long_about = None)]
struct Args {
    /// Settings file
    #[arg(short, long, default_value = SETTINGS_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile an SCL file and print its signal tree
    Inspect {
        file: PathBuf,

        /// IED to expand (default: first IED with logical devices)
        #[arg(long)]
        ied: Option<String>,

        /// Print the tree as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the communication parameters of every IED as JSON
    Ieds { file: PathBuf },
    /// Print the GOOSE publisher/subscriber map as JSON
    Goose { file: PathBuf },
    /// Connect the devices of a project and log signal updates until Ctrl+C
    Run {
        #[arg(short, long, default_value = "devices.json")]
        project: PathBuf,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    let settings = Settings::load(&args.config)?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.log_filter)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match args.command {
        Command::Inspect { file, ied, json } => inspect(&file, ied.as_deref(), json),
        Command::Ieds { file } => {
            let compiler = open(&file)?;
            println!("{}", serde_json::to_string_pretty(&compiler.extract_ieds_info())?);
            Ok(())
        }
        Command::Goose { file } => {
            let compiler = open(&file)?;
            println!("{}", serde_json::to_string_pretty(&compiler.extract_goose_map())?);
            Ok(())
        }
        Command::Run { project } => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?
            .block_on(run(settings, project)),
    }
}

fn open(file: &Path) -> Result<SclCompiler> {
    let compiler = SclCompiler::open(Arc::new(SclCache::new()), file);
    if let Some(e) = compiler.error() {
        anyhow::bail!("cannot load {}: {}", file.display(), e);
    }
    Ok(compiler)
}

fn inspect(file: &Path, ied: Option<&str>, json: bool) -> Result<()> {
    let compiler = open(file)?;
    let root = compiler.get_structure(ied);
    if json {
        println!("{}", serde_json::to_string_pretty(&root)?);
    } else {
        print_tree(&root, 0);
        println!("{} signals", root.signal_count());
    }
    Ok(())
}

fn print_tree(node: &Node, depth: usize) {
    let indent = "  ".repeat(depth);
    if node.description.is_empty() {
        println!("{}{}", indent, node.name);
    } else {
        println!("{}{} ({})", indent, node.name, node.description);
    }
    for signal in &node.signals {
        let labels = signal
            .enum_map
            .as_ref()
            .map(|m| format!(" {:?}", m))
            .unwrap_or_default();
        println!(
            "{}  - {} [{}] {} {:?}{}",
            indent, signal.address, signal.fc, signal.access, signal.signal_type, labels
        );
    }
    for child in &node.children {
        print_tree(child, depth + 1);
    }
}

async fn run(settings: Settings, project: PathBuf) -> Result<()> {
    info!("Starting Scout v{}", env!("CARGO_PKG_VERSION"));

    let mut registry = DeviceRegistry::new(settings)?;
    let count = registry
        .load_configuration(&project)
        .with_context(|| format!("loading {}", project.display()))?;
    info!("Loaded {} devices from {}", count, project.display());

    for name in registry.device_names() {
        let enabled = registry.get_device(&name).is_some_and(|d| d.config.enabled);
        if !enabled {
            continue;
        }
        if let Err(e) = registry.connect_device(&name) {
            warn!("Cannot connect {}: {}", name, e);
        }
    }

    let mut events = registry.events().receiver();
    let mut tick = tokio::time::interval(Duration::from_millis(50));
    let mut subscribed: HashSet<String> = HashSet::new();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
            _ = tick.tick() => {
                registry.process_pending();
                subscribe_status_signals(&registry, &mut subscribed);
            }
            event = events.recv() => match event {
                Ok(RegistryEvent::SignalUpdated { device, signal }) => {
                    let value = signal.value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string());
                    info!("{} {} = {} ({:?})", device, signal.address, value, signal.quality);
                }
                Ok(RegistryEvent::ConnectionProgress { device, percent, message }) => {
                    info!("{} [{}%] {}", device, percent, message);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => warn!("Dropped {} events", n),
                Err(RecvError::Closed) => break,
            }
        }
    }

    for name in registry.device_names() {
        let _ = registry.disconnect_device(&name);
    }
    info!("Scout stopped");
    Ok(())
}

/// Poll every status signal of devices that just came up
fn subscribe_status_signals(registry: &DeviceRegistry, subscribed: &mut HashSet<String>) {
    for device in registry.devices() {
        let name = device.name();
        if subscribed.contains(name) || !registry.is_running(name) {
            continue;
        }
        let Some(root) = &device.root else {
            continue;
        };

        let mut added = 0;
        root.walk_signals(&mut |signal| {
            // Status and measurements; Modbus registers carry no FC
            if matches!(signal.fc.as_str(), "ST" | "MX" | "") {
                let sub = Subscription::new(name, &signal.address, &signal.fc, SubscriptionMode::ReadPolling, "cli");
                if registry.subscriptions().subscribe(sub) {
                    added += 1;
                }
            }
        });
        info!("Polling {} signals of {}", added, name);
        subscribed.insert(name.to_string());
    }
}
