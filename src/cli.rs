use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// provisiond - bare-metal node provisioning service
#[derive(Parser)]
#[command(name = "provisiond")]
#[command(about = "Bare-metal node provisioning service with a versioned HTTP API")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API
    Serve {
        /// Path to configuration file (defaults are used when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the configured listen address (e.g. 0.0.0.0:6385)
        #[arg(short, long)]
        listen: Option<String>,
    },
    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        config: PathBuf,
    },
    /// Print the provision state transition table
    States {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = StatesFormat::Table)]
        format: StatesFormat,
    },
    /// Print the API microversion history
    Versions,
}

/// Output formats for the `states` command
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatesFormat {
    /// Aligned text table
    Table,
    /// Graphviz dot graph
    Dot,
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}
