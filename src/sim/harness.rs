//! CLI entry point for the simulation harness: runs a session against the
//! simulated controller and prints what happened.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use stepper_link::calibration::calibrate;
use stepper_link::config::{Config, load_config};
use stepper_link::protocol::{InputKind, ToolCommand, ToolDescriptor};
use stepper_link::session::Session;
use stepper_link::sim::{SimConfig, Simulator};
use stepper_link::transport::memory_pair;

/// Simulation Harness CLI
#[derive(Parser, Debug)]
#[command(name = "sim-harness", about = "Drive a session against the simulated controller.")]
pub struct Cli {
    /// Path to a TOML config file (overrides defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Steps between the two limit switches
    #[arg(long, default_value_t = 4000)]
    travel: i64,

    /// Attach a simulated gripper tool
    #[arg(long)]
    with_tool: bool,

    /// Log every line sent and received
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a full calibration (default)
    Calibrate,
    /// Send queued commands in order and print each reply
    Script { commands: Vec<String> },
    /// Discover the tool and run each of its commands
    Tool,
}

fn gripper() -> ToolDescriptor {
    ToolDescriptor {
        name: "Gripper".to_string(),
        commands: vec![
            ToolCommand {
                cmd: "open".to_string(),
                is_queue: true,
                ..Default::default()
            },
            ToolCommand {
                cmd: "close".to_string(),
                is_queue: true,
                ..Default::default()
            },
            ToolCommand {
                cmd: "w<val>".to_string(),
                input_type: InputKind::Value("number".to_string()),
                ..Default::default()
            },
        ],
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    let cli = Cli::parse();
    let level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = match &cli.config {
        Some(path) => load_config(&path.to_string_lossy())?,
        None => Config::default(),
    };

    let sim_config = SimConfig {
        axes: config.motion.axes.clone(),
        travel: cli.travel,
        start: cli.travel / 2,
        tool: cli.with_tool.then(gripper),
        ..SimConfig::default()
    };
    let expected = sim_config.expected_length();

    let (transport, device) = memory_pair();
    let simulator = Simulator::new(sim_config).spawn(device);
    let session = Session::new(&config);
    session.connect(&transport).await?;

    match cli.command.unwrap_or(Commands::Calibrate) {
        Commands::Calibrate => {
            let lengths = calibrate(&session, &config.calibration).await?;
            for axis in &lengths {
                println!("{}: {} steps (expected {})", axis.axis, axis.length, expected);
            }
        }
        Commands::Script { commands } => {
            for command in &commands {
                match session.send(command).await {
                    Ok(reply) => println!("{} -> {}", command, reply.to_value()),
                    Err(e) => println!("{} -> error: {}", command, e),
                }
            }
        }
        Commands::Tool => {
            session.refresh_tools().await;
            let info = session.tool_info().await;
            println!("{} ({} commands)", info.name, info.commands.len());
            for command in &info.commands {
                let value = command.requires_value().then_some("10");
                match session.execute_tool_command(command, value).await {
                    Ok(Some(reply)) => println!("{} -> {}", command.cmd, reply.to_value()),
                    Ok(None) => println!("{} -> sent", command.cmd),
                    Err(e) => println!("{} -> error: {}", command.cmd, e),
                }
            }
        }
    }

    session.disconnect().await;
    let _ = simulator.await;
    Ok(())
}
