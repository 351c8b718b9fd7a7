//! Mission Control CLI - run a demo bridge, watch one, or send it commands.
//!
//! This is the main binary entry point. See the `mission_control` library
//! for the core functionality.

use anyhow::{Context, Result};
use mission_control::{run_loop, CommandCall, Config, ConsoleClient, Endpoint, MissionControl, Shared};
use mimalloc::MiMalloc;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
/// mimalloc provides better multi-threaded performance than the system allocator.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;
use clap::{Args, Parser, Subcommand};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Global flag for signal-triggered shutdown (as Arc for signal-hook compatibility)
static SHUTDOWN_FLAG: std::sync::LazyLock<Arc<AtomicBool>> =
    std::sync::LazyLock::new(|| Arc::new(AtomicBool::new(false)));

fn register_signals() -> Result<()> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::flag;
    flag::register(SIGINT, Arc::clone(&SHUTDOWN_FLAG))?;
    flag::register(SIGTERM, Arc::clone(&SHUTDOWN_FLAG))?;
    flag::register(SIGHUP, Arc::clone(&SHUTDOWN_FLAG))?;
    Ok(())
}

#[derive(Parser)]
#[command(name = "mission-control")]
#[command(version, about = "Telemetry and command bridge for embedded applications")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Where to listen or connect. Falls back to the configured endpoint.
#[derive(Args, Debug)]
struct EndpointArgs {
    /// Unix socket path
    #[arg(long, conflicts_with = "port")]
    socket: Option<PathBuf>,
    /// TCP port
    #[arg(long)]
    port: Option<u16>,
    /// TCP address (with --port)
    #[arg(long, requires = "port")]
    host: Option<IpAddr>,
}

impl EndpointArgs {
    fn resolve(&self, configured: &Endpoint, default_host: IpAddr) -> Endpoint {
        if let Some(path) = &self.socket {
            Endpoint::Unix(path.clone())
        } else if let Some(port) = self.port {
            Endpoint::Tcp(SocketAddr::new(self.host.unwrap_or(default_host), port))
        } else {
            configured.clone()
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run a bridge with a small demo registry
    Serve {
        #[command(flatten)]
        endpoint: EndpointArgs,
        /// Ticks per second
        #[arg(long)]
        tick_hz: Option<u32>,
        /// Maximum simultaneous consoles
        #[arg(long)]
        max_connections: Option<usize>,
    },
    /// Print frames received from a bridge, one per line
    Watch {
        #[command(flatten)]
        endpoint: EndpointArgs,
        /// Stop after this many frames
        #[arg(long)]
        frames: Option<usize>,
    },
    /// Send one command to a bridge and exit
    Send {
        #[command(flatten)]
        endpoint: EndpointArgs,
        /// Command name followed by its arguments
        #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

/// Builds the demo registry: a clock, a sine wave, noise, and two writables.
fn register_demo(bridge: &mut MissionControl) -> Shared<u64> {
    let started = Instant::now();
    let pings = Shared::new(0_u64);
    let throttle = Shared::new(0.0_f64);
    let label = Shared::new(String::from("demo"));

    let registry = bridge.registry_mut();
    registry.bind_readable_fn("time", move || started.elapsed().as_secs_f64());
    registry.bind_readable_fn("clock", || chrono::Local::now().format("%H:%M:%S").to_string());
    registry.bind_readable_fn("sine", move || {
        (started.elapsed().as_secs_f64() * std::f64::consts::PI).sin()
    });
    registry.bind_readable_fn("noise", rand::random::<f64>);
    registry.bind_readable("pings", &pings);
    registry.add_writable("throttle", &throttle, |new: f64, _| new.clamp(0.0, 1.0));
    registry.bind_writable("label", &label);

    let counter = pings.clone();
    registry.add_command("ping", move |args| {
        counter.update(|n| *n += 1);
        log::info!("ping {:?}", args);
        Ok(())
    });
    registry.add_command("fail", |args| {
        anyhow::bail!("requested failure ({} args)", args.len())
    });

    pings
}

fn serve(endpoint: &EndpointArgs, tick_hz: Option<u32>, max_connections: Option<usize>) -> Result<()> {
    register_signals()?;

    let mut config = Config::load()?;
    config.endpoint = endpoint.resolve(&config.endpoint, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    if let Some(hz) = tick_hz {
        config.tick_rate_hz = hz;
    }
    if max_connections.is_some() {
        config.max_connections = max_connections;
    }

    let mut bridge = MissionControl::from_config(&config)
        .with_context(|| format!("Failed to start bridge on {}", config.endpoint))?;
    register_demo(&mut bridge);
    bridge.log_info("Demo bridge started");

    println!(
        "Mission Control v{} listening on {} at {} Hz",
        env!("CARGO_PKG_VERSION"),
        bridge.local_endpoint(),
        config.tick_rate_hz
    );

    let ticks = run_loop(&mut bridge, config.tick_rate_hz, &SHUTDOWN_FLAG);

    println!("Shutting down after {ticks} ticks...");
    Ok(())
}

fn client_endpoint(args: &EndpointArgs) -> Result<Endpoint> {
    let config = Config::load()?;
    Ok(args.resolve(&config.endpoint, IpAddr::V4(Ipv4Addr::LOCALHOST)))
}

fn watch(endpoint: &EndpointArgs, frames: Option<usize>) -> Result<()> {
    register_signals()?;

    let endpoint = client_endpoint(endpoint)?;
    let mut client = ConsoleClient::connect(&endpoint)?;
    let mut printed = 0_usize;

    while !SHUTDOWN_FLAG.load(Ordering::Relaxed) && frames.is_none_or(|n| printed < n) {
        match client.recv_frame(Duration::from_millis(250)) {
            Ok(Some(frame)) => {
                println!("{frame}");
                printed += 1;
            }
            Ok(None) => {}
            Err(e) => {
                eprintln!("{e}");
                break;
            }
        }
    }

    Ok(())
}

fn send(endpoint: &EndpointArgs, command: &[String]) -> Result<()> {
    let (name, args) = command.split_first().context("No command given")?;
    let call = CommandCall::new(name.clone(), args.to_vec());

    let endpoint = client_endpoint(endpoint)?;
    let mut client = ConsoleClient::connect(&endpoint)?;
    client.send_command(&call)?;
    log::info!("Sent {} to {}", call.to_line(), endpoint);
    Ok(())
}

fn init_logging() -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format_timestamp_secs();

    // MISSION_CONTROL_LOG_FILE keeps log output away from printed frames
    if let Ok(path) = std::env::var("MISSION_CONTROL_LOG_FILE") {
        let log_file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create log file at {path}"))?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }

    builder.init();
    Ok(())
}

fn main() -> Result<()> {
    init_logging()?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            endpoint,
            tick_hz,
            max_connections,
        } => serve(&endpoint, tick_hz, max_connections)?,
        Commands::Watch { endpoint, frames } => watch(&endpoint, frames)?,
        Commands::Send { endpoint, command } => send(&endpoint, &command)?,
    }

    Ok(())
}
