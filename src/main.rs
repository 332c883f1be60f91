//! Boatlink CLI - operator frontend for the boat control channel.
//!
//! This is the main binary entry point. See the `boatlink` library for the
//! session layer itself.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::timeout;

use boatlink::{Command, Config, Event, LinkState, SessionCoordinator};

/// How long interactive commands wait for the boat before giving up.
const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

// CLI
#[derive(Parser)]
#[command(name = "boatlink")]
#[command(version)]
#[command(about = "Control-channel client for a remotely operated boat")]
struct Cli {
    /// Boat hostname or IP (overrides config)
    #[arg(long, global = true)]
    host: Option<String>,

    /// Control-channel TCP port (overrides config)
    #[arg(long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and print decoded telemetry until interrupted
    Monitor,
    /// Request and print the boat info snapshot
    Info,
    /// Set the active mission/mode and wait for the boat's ack
    SetMission {
        /// Mission identifier
        mission: String,
    },
    /// Steer toward a waypoint and wait for the boat's ack
    Waypoint {
        /// Longitude in degrees
        lon: f64,
        /// Latitude in degrees
        lat: f64,
    },
    /// Show or update the stored configuration
    Config {
        key: Option<String>,
        value: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    let mut config = Config::load()?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    match cli.command {
        Commands::Monitor => run_monitor(&config).await?,
        Commands::Info => run_info(&config).await?,
        Commands::SetMission { mission } => {
            run_acked(&config, Command::SetMission { mission }, "SM").await?;
        }
        Commands::Waypoint { lon, lat } => {
            run_acked(&config, Command::set_waypoint(lon, lat), "SA").await?;
        }
        Commands::Config { key, value } => run_config(key, value)?,
    }

    Ok(())
}

/// Stream decoded events to stdout until Ctrl-C.
async fn run_monitor(config: &Config) -> Result<()> {
    let mut session = SessionCoordinator::new(config.host.clone(), config.port);
    let mut events = session.subscribe();
    session.start()?;

    println!("Monitoring {}:{} (Ctrl-C to stop)...", config.host, config.port);
    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(n)) => eprintln!("(dropped {n} events, falling behind)"),
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.stop().await;
    Ok(())
}

/// Connect, wait for the boat info snapshot, print it, disconnect.
async fn run_info(config: &Config) -> Result<()> {
    let mut session = SessionCoordinator::new(config.host.clone(), config.port);
    let mut events = session.subscribe();
    session.start()?;

    // The session requests boat info itself on every connect.
    let info = timeout(REPLY_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(Event::BoatInfo { name, captain, mission })
                | Ok(Event::BoatInfoChanged { name, captain, mission }) => {
                    return Some((name, captain, mission));
                }
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .await;

    session.stop().await;

    let (name, captain, mission) = info
        .ok()
        .flatten()
        .context("no boat info within the reply window")?;
    println!("Boat:    {name}");
    println!("Captain: {captain}");
    println!("Mission: {mission}");
    Ok(())
}

/// Send one ack-tracked command and wait for the matching `CA` frame.
async fn run_acked(config: &Config, cmd: Command, expected_type: &str) -> Result<()> {
    let mut session = SessionCoordinator::new(config.host.clone(), config.port);
    let mut events = session.subscribe();
    let mut state = session.link_state();
    session.start()?;

    timeout(REPLY_TIMEOUT, async {
        while *state.borrow_and_update() != LinkState::Connected {
            state.changed().await?;
        }
        Ok::<_, anyhow::Error>(())
    })
    .await
    .context("timed out connecting to the boat")??;

    session.send(cmd).await?;

    let acked = timeout(REPLY_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(Event::CommandAck { command_type, seq }) if command_type == expected_type => {
                    return Some(seq);
                }
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .await;

    session.stop().await;

    match acked {
        Ok(Some(seq)) => {
            println!("Acknowledged (#{seq}).");
            Ok(())
        }
        Ok(None) => anyhow::bail!("session closed before the ack arrived"),
        Err(_) => anyhow::bail!("boat did not acknowledge within {}s", REPLY_TIMEOUT.as_secs()),
    }
}

fn run_config(key: Option<String>, value: Option<String>) -> Result<()> {
    let mut config = Config::load()?;
    match (key, value) {
        (None, None) => println!("{}", serde_json::to_string_pretty(&config)?),
        (Some(k), Some(v)) => {
            match k.as_str() {
                "host" => config.host = v,
                "port" => config.port = v.parse().context("port must be a number")?,
                other => anyhow::bail!("unknown config key '{other}' (host, port)"),
            }
            config.save()?;
            println!("Saved.");
        }
        (Some(k), None) => match k.as_str() {
            "host" => println!("{}", config.host),
            "port" => println!("{}", config.port),
            other => anyhow::bail!("unknown config key '{other}' (host, port)"),
        },
        (None, Some(_)) => unreachable!("clap requires key before value"),
    }
    Ok(())
}

fn print_event(event: &Event) {
    match event {
        Event::BoatInfo { name, captain, mission } => {
            println!("info     boat={name} captain={captain} mission={mission}");
        }
        Event::BoatInfoChanged { name, captain, mission } => {
            println!("info*    boat={name} captain={captain} mission={mission}");
        }
        Event::PositionUpdate { lon, lat, speed_cm_s, seq } => {
            println!("position #{seq} lon={lon} lat={lat} speed={speed_cm_s}cm/s");
        }
        Event::SensorReading(s) => {
            println!(
                "sensors  accel=({},{},{}) gyro=({},{},{}) mag=({},{},{}) \
                 angle=({},{},{}) depth={}",
                s.accel_x, s.accel_y, s.accel_z, s.gyro_x, s.gyro_y, s.gyro_z, s.mag_x, s.mag_y,
                s.mag_z, s.angle_x, s.angle_y, s.angle_z, s.depth
            );
        }
        Event::Warning { code } => println!("warning  {code}"),
        Event::LostAck { seq } => println!("lost-ack #{seq}"),
        Event::CommandAck { command_type, seq } => println!("ack      {command_type} #{seq}"),
    }
}
