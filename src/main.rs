//! petrinet - Petri net state-space analyzer
//!
//! Explores the reachable markings of a net, reports deadlocks and linear
//! invariants, renders nets as DOT, and drives named instances through an
//! interactive dispatcher.

mod commands;
mod config;
mod repl;

use clap::{Parser, Subcommand};
use colored::Colorize;
use config::Config;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "petrinet")]
#[command(about = "Petri net state-space analyzer")]
#[command(version)]
struct Cli {
    /// YAML config file (overrides PETRINET_CONFIG)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Explore a net and report terminal states, deadlock freedom and invariants
    Analyse {
        /// Net definition (JSON, or YAML by extension)
        net: PathBuf,

        /// Include a DOT rendering of the net
        #[arg(long)]
        dot: bool,

        /// Place weights to check as an invariant (JSON or @file.json); repeatable
        #[arg(short, long = "invariant")]
        invariants: Vec<String>,

        /// Abort once this many markings are discovered (0 = unbounded)
        #[arg(long)]
        max_states: Option<usize>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Render a net as Graphviz DOT
    Dot {
        /// Net definition (JSON, or YAML by extension)
        net: PathBuf,

        /// Marking to render instead of the initial one (JSON or @file.json)
        #[arg(short, long)]
        marking: Option<String>,
    },

    /// List every reachable marking
    Reachable {
        /// Net definition (JSON, or YAML by extension)
        net: PathBuf,

        /// Abort once this many markings are discovered (0 = unbounded)
        #[arg(long)]
        max_states: Option<usize>,

        /// Show a shortest firing sequence to each marking
        #[arg(short, long)]
        trace: bool,

        /// Print markings as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start an interactive dispatcher over a net
    Repl {
        /// Net definition (JSON, or YAML by extension)
        net: PathBuf,
    },
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    };
    tracing::debug!("Using configuration: {:?}", config);

    match commands::execute(cli.command, &config) {
        Ok(output) if output.is_empty() => {}
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    }
}
