// src/main.rs - stepper-host command line
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use stepper_link::config::{Config, load_config};
use stepper_link::session::{Session, SessionEvent};
use stepper_link::transport::{SerialTransport, list_ports};
use stepper_link::calibrate;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Parser, Debug)]
#[command(name = "stepper-host", about = "Talk to a three-axis stepper controller over serial.")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port (overrides the config file)
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate (overrides the config file)
    #[arg(short, long)]
    baud: Option<u32>,

    /// Log protocol traffic
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports
    Ports,
    /// Queue commands in order and print each reply
    Send { commands: Vec<String> },
    /// Write a command ahead of the queue
    Immediate { command: String },
    /// Query and print the state of every axis
    Status,
    /// Discover the tool, or run one of its commands
    Tool { name: Option<String>, value: Option<String> },
    /// Measure axis travel between the limit switches
    Calibrate,
    /// Print every line from the controller until interrupted
    Monitor,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();
    let level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            load_config(&path.to_string_lossy())?
        }
        None => Config::default(),
    };
    if let Some(port) = cli.port {
        config.serial.port = port;
    }
    if let Some(baud) = cli.baud {
        config.serial.baud = baud;
    }

    if let Command::Ports = cli.command {
        for port in list_ports() {
            println!("{}", port);
        }
        return Ok(());
    }

    if config.serial.port.is_empty() {
        return Err("no serial port configured; pass --port or set serial.port".into());
    }
    let session = Session::new(&config);
    let transport = SerialTransport::new(config.serial.port.clone(), config.serial.baud);
    session.connect(&transport).await?;

    let result = run(&session, &config, cli.command).await;
    session.disconnect().await;
    result
}

async fn run(session: &Session, config: &Config, command: Command) -> Result<(), BoxError> {
    match command {
        Command::Ports => {}
        Command::Send { commands } => {
            for command in &commands {
                let reply = session.send(command).await?;
                println!("{}", reply.to_value());
            }
        }
        Command::Immediate { command } => session.send_immediate(&command).await?,
        Command::Status => {
            session.send("d").await?;
            for (name, motor) in session.state().await.motors() {
                let position = motor
                    .position()
                    .map_or_else(|| "?".to_string(), |p| p.to_string());
                println!("{:<10} {:<8} {}", name, motor.status.to_string(), position);
            }
        }
        Command::Tool { name, value } => {
            session.refresh_tools().await;
            let info = session.tool_info().await;
            match name {
                Some(name) => match session.run_tool_command(&name, value.as_deref()).await? {
                    Some(reply) => println!("{}", reply.to_value()),
                    None => println!("sent"),
                },
                None => {
                    println!("{} (available: {})", info.name, info.is_available);
                    for command in &info.commands {
                        let queued = if command.is_queue { "queued" } else { "immediate" };
                        println!("  {:<16} {}", command.cmd, queued);
                    }
                }
            }
        }
        Command::Calibrate => {
            for axis in calibrate(session, &config.calibration).await? {
                println!("{}: {}", axis.axis, axis.length);
            }
        }
        Command::Monitor => {
            let mut events = session.subscribe();
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    event = events.recv() => match event {
                        Ok(SessionEvent::Line(line)) => println!("{}", line),
                        Ok(SessionEvent::Disconnected(reason)) => {
                            tracing::warn!("Controller disconnected: {}", reason);
                            break;
                        }
                        Ok(_) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                            tracing::warn!("Monitor fell behind, {} events dropped", missed);
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        }
    }
    Ok(())
}
