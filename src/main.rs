pub mod config;
pub mod listener;
pub mod mapping;

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::AppConfig;
use crate::listener::{GilrsSource, ListenMode, ListenerEvent, ListenerHandle};
use crate::mapping::{
    LayoutCatalog, LayoutFile, MappingError, MappingSession, SessionProgress,
    CUSTOM_LAYOUTS_FILE, HOME_BUTTON,
};

/// Raw event log written while running in inspect mode.
const INSPECT_LOG_FILE: &str = "joymapper_inspect.txt";

#[derive(Parser, Debug)]
#[command(
    name = "joymapper",
    version,
    about = "Interactively map joystick inputs onto a named button layout"
)]
struct Cli {
    /// Layout to configure (see --list-layouts)
    #[arg(short, long)]
    layout: Option<String>,

    /// Instance id of the joystick to configure; defaults to the first one
    /// that commits an input
    #[arg(short, long)]
    joystick: Option<u32>,

    /// Output file for the generated layout (a name is derived when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Refuse to save unless every button of the layout is assigned
    #[arg(long)]
    force_complete: bool,

    /// Print every raw event instead of running a mapping session
    #[arg(long)]
    inspect: bool,

    /// List the known layouts and exit
    #[arg(long)]
    list_layouts: bool,

    /// Print the contents of a saved layout file and exit
    #[arg(long, value_name = "FILE")]
    show: Option<PathBuf>,

    /// Configuration file (strict; the default location is best-effort)
    #[arg(long, value_name = "FILE", env = "JOYMAPPER_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load_default(),
    };
    let catalog = LayoutCatalog::load(Path::new(CUSTOM_LAYOUTS_FILE));

    if cli.list_layouts {
        for name in catalog.names() {
            println!("{name}");
        }
        return Ok(());
    }

    if let Some(path) = &cli.show {
        return show_layout_file(path, &catalog);
    }

    let mode = if cli.inspect {
        ListenMode::Free
    } else {
        ListenMode::Guided
    };

    info!("Starting listener");
    let mut handle = ListenerHandle::spawn(config.listener_settings(), mode, GilrsSource::new)
        .map_err(|e| eyre!("Failed to start listener: {}", e))?;
    let mut events = handle
        .take_events()
        .ok_or_else(|| eyre!("Event stream already taken"))?;

    // Ctrl-C flips a token the consumer loops observe; the worker itself is
    // stopped through its own flag below.
    let shutdown = CancellationToken::new();
    let interrupt = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            interrupt.cancel();
        }
    });

    let result = if cli.inspect {
        run_inspect(&mut events, &shutdown).await
    } else {
        run_mapping(&cli, &config, &catalog, &handle, &mut events, &shutdown).await
    };

    handle.request_stop();
    handle.join();
    result
}

/// Drives one guided mapping session to completion and saves the artifact.
async fn run_mapping(
    cli: &Cli,
    config: &AppConfig,
    catalog: &LayoutCatalog,
    handle: &ListenerHandle,
    events: &mut mpsc::UnboundedReceiver<ListenerEvent>,
    shutdown: &CancellationToken,
) -> Result<()> {
    let layout_name = cli
        .layout
        .clone()
        .unwrap_or_else(|| config.default_layout.clone());
    let layout = catalog
        .get(&layout_name)
        .ok_or_else(|| MappingError::UnknownLayout(layout_name.clone()))?
        .clone();
    if layout.is_empty() {
        return Err(eyre!("Layout '{layout_name}' has no buttons"));
    }

    let mut session = MappingSession::new(layout, cli.joystick, cli.force_complete);
    prompt(&session, config);

    let no_controller_check = tokio::time::sleep(Duration::from_secs(5));
    tokio::pin!(no_controller_check);
    let mut checked = false;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                warn!("Mapping aborted before completion, nothing saved");
                return Ok(());
            }
            _ = &mut no_controller_check, if !checked => {
                checked = true;
                if handle.current_devices().is_empty() {
                    warn!("No controllers detected yet, connect one to continue");
                }
            }
            event = events.recv() => {
                let Some(event) = event else {
                    return Err(eyre!("Listener terminated unexpectedly"));
                };
                match event {
                    ListenerEvent::DevicesChanged(devices) => {
                        if devices.is_empty() {
                            warn!("All controllers disconnected");
                        } else {
                            info!("{} controller(s) attached", devices.len());
                        }
                        session.update_devices(devices);
                    }
                    ListenerEvent::Classified(classified) => {
                        match session.apply(classified) {
                            SessionProgress::Assigned { button, description } => {
                                println!("  {button} -> {description}");
                            }
                            SessionProgress::Omitted { button } => {
                                println!("  {button} -> omitted");
                            }
                            SessionProgress::AlreadyAssigned { button, description } => {
                                println!(
                                    "  {description} is already assigned; press another input for {button}"
                                );
                                continue;
                            }
                            SessionProgress::Pending => continue,
                        }

                        if session.is_complete() {
                            let file = session.to_layout_file()?;
                            let path = file.save(cli.output.as_deref(), &config.output_dir())?;
                            println!("Layout saved to {}", path.display());
                            return Ok(());
                        }
                        prompt(&session, config);
                    }
                }
            }
        }
    }
}

fn prompt(session: &MappingSession, config: &AppConfig) {
    if let Some(label) = session.current_label() {
        if label == HOME_BUTTON {
            println!(
                "Press and release the guide/home button (hold {} s to skip)",
                config.skip_after_secs
            );
        } else {
            println!(
                "Press and release the input for {label} (hold {} s to skip)",
                config.skip_after_secs
            );
        }
    }
}

/// Prints every raw event and mirrors it into the inspect log file.
async fn run_inspect(
    events: &mut mpsc::UnboundedReceiver<ListenerEvent>,
    shutdown: &CancellationToken,
) -> Result<()> {
    use std::io::Write;

    // One log per inspect session.
    let log_path = Path::new(INSPECT_LOG_FILE);
    if log_path.exists() {
        let _ = std::fs::remove_file(log_path);
    }
    let mut log = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;

    println!("Inspect mode: every raw event is printed and appended to {INSPECT_LOG_FILE}");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            event = events.recv() => {
                let Some(event) = event else {
                    return Err(eyre!("Listener terminated unexpectedly"));
                };
                let line = match &event {
                    ListenerEvent::DevicesChanged(devices) => {
                        format!("devices changed: {devices:?}")
                    }
                    ListenerEvent::Classified(classified) => {
                        format!("type {}: {classified:?}", classified.type_code())
                    }
                };
                println!("{line}");
                writeln!(log, "[{}] {}", Local::now().format("%H:%M:%S%.3f"), line)?;
            }
        }
    }
}

fn show_layout_file(path: &Path, catalog: &LayoutCatalog) -> Result<()> {
    let file = LayoutFile::load(path, catalog)?;

    println!("Layout: {}", file.layout);
    println!("Configured joystick: {}", file.joystick_configured);
    if let Some(info) = file.joysticks_info.get(&file.joystick_configured) {
        println!("  {} ({})", info.name, info.guid);
    }
    if let Some(assignments) = file.configured_assignments() {
        for (button, assignment) in assignments {
            println!("  {button} -> {}", assignment.describe());
        }
    }
    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
