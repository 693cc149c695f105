//! callroute - scripted simulator for the call audio route engine
//!
//! Runs the route coordinator against an in-memory handset and prints every
//! device-list notification the host application would receive.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use callroute_core::{setup_logging, LoggingConfig, RouteConfig};

mod script;
mod simulator;

use simulator::{OutputFormat, Simulator, DEMO_SCRIPT};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Coordinator configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print notifications and state as JSON lines
    #[arg(long, global = true)]
    json: bool,

    /// Log level, overriding the configuration file
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Simulate a platform without managed call routing
    #[arg(long, global = true)]
    no_managed: bool,

    #[command(subcommand)]
    command: Command,
}

/// Subcommands
#[derive(Subcommand, Debug)]
enum Command {
    /// Run a simulation script
    Run {
        /// Script file, one command per line
        script: PathBuf,
    },
    /// Run the built-in walkthrough
    Demo,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => RouteConfig::load(path)?,
        None => RouteConfig::default().with_logging(LoggingConfig::new("warn", "callroute")),
    };
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    setup_logging(&config.logging)?;

    let source = match &args.command {
        Command::Run { script } => std::fs::read_to_string(script)
            .with_context(|| format!("Failed to read script {}", script.display()))?,
        Command::Demo => DEMO_SCRIPT.to_string(),
    };
    let commands = script::parse_script(&source)?;

    let format = if args.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };
    let mut simulator = Simulator::start(config, !args.no_managed, format).await?;

    for command in &commands {
        if format == OutputFormat::Text {
            println!("> {}", describe(command));
        }
        for line in simulator.step(command).await? {
            println!("{}", line);
        }
    }

    simulator.shutdown().await?;
    info!(commands = commands.len(), "Simulation finished");
    Ok(())
}

fn describe(command: &script::ScriptCommand) -> String {
    use script::ScriptCommand::*;

    match command {
        Plug(kind) => format!("plug {:?}", kind),
        Unplug(kind) => format!("unplug {:?}", kind),
        Mode(mode) => format!("mode {}", mode),
        Select(device) => format!("select {}", device),
        Focus(change) => format!("focus {:?}", change),
        Managed(enabled) => format!("managed {}", if *enabled { "on" } else { "off" }),
        Route(device) => format!("route {}", device),
        Refresh => "refresh".to_string(),
        State => "state".to_string(),
    }
}
