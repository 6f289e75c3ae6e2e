//! CLI argument definitions.

use clap::{Parser, Subcommand};

/// Healthmind -- a self-hosted personal health assistant.
#[derive(Parser)]
#[command(name = "healthmind", version, about = "Healthmind -- self-hosted personal health assistant")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the web server (chat, document, lab, and symptom surfaces).
    Serve {
        /// Address to bind the HTTP server to.
        #[arg(long)]
        bind: Option<String>,

        /// Port to listen on.
        #[arg(long, short)]
        port: Option<u16>,
    },

    /// Initialize the database and upload directory.
    Setup,

    /// Show current configuration and inference server reachability.
    Status,
}
