//! Hotmirror CLI - Live preview client for declarative UI projects
//!
//! Hotmirror mirrors a project pushed by a host machine into a local sandbox
//! and keeps it in sync while you edit.
//!
//! ## Quick Start
//!
//! ```bash
//! # List hosts announcing themselves on the network
//! hotmirror scan
//!
//! # Mirror the first host found (or pass its address)
//! hotmirror connect
//! hotmirror connect 192.168.1.20:52580
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

use anyhow::Result;
use clap::Parser;

mod commands;
pub mod ui;

use commands::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Command::Scan(args) => commands::scan::run(args).await,
        Command::Connect(args) => commands::connect::run(args).await,
        Command::Announce(args) => commands::announce::run(args).await,
        Command::Cat(args) => commands::cat::run(&args),
        Command::Config(args) => commands::config::run(args.action),
        Command::Completions(args) => {
            commands::completions::run(args.shell);
            Ok(())
        }
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,hotmirror=info,hotmirror_core=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
