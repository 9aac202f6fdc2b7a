//! CLI command definitions and subcommands

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;

/// RelayBroker - leader-elected pub/sub relay
#[derive(Parser, Debug)]
#[command(
    name = "rb",
    about = "Leader-elected pub/sub relay broker",
    version,
    after_help = "Logs are written to: ~/.local/share/relaybroker/logs/relaybroker.log"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Log to stderr instead of the log file
    #[arg(long, global = true)]
    pub log_stderr: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Identity overrides shared by subcommands
#[derive(Args, Debug, Default, Clone)]
pub struct IdentityArgs {
    /// Name registered with the discovery service
    #[arg(long)]
    pub name: Option<String>,

    /// Advertised address, as written in the leader record
    #[arg(short, long)]
    pub addr: Option<String>,

    /// Publish port
    #[arg(short, long)]
    pub port: Option<u16>,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Wait for leadership, register with discovery and relay until interrupted
    Run {
        #[command(flatten)]
        identity: IdentityArgs,

        /// Topics to relay (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        topics: Vec<String>,

        /// etcd endpoints (comma-separated)
        #[arg(long = "etcd", value_delimiter = ',')]
        endpoints: Vec<String>,
    },

    /// Show the current leader record and whether this identity holds it
    Leader {
        #[command(flatten)]
        identity: IdentityArgs,

        /// etcd endpoints (comma-separated)
        #[arg(long = "etcd", value_delimiter = ',')]
        endpoints: Vec<String>,
    },

    /// Show the current discovery endpoint
    Endpoint {
        /// etcd endpoints (comma-separated)
        #[arg(long = "etcd", value_delimiter = ',')]
        endpoints: Vec<String>,
    },
}

impl Cli {
    /// Apply command-line overrides on top of the loaded config
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(level) = &self.log_level {
            config.log_level = Some(level.clone());
        }

        let (identity, topics, endpoints) = match &self.command {
            Command::Run {
                identity,
                topics,
                endpoints,
            } => (Some(identity), topics.as_slice(), endpoints),
            Command::Leader { identity, endpoints } => (Some(identity), &[][..], endpoints),
            Command::Endpoint { endpoints } => (None, &[][..], endpoints),
        };

        if let Some(identity) = identity {
            if let Some(name) = &identity.name {
                config.broker.name = name.clone();
            }
            if let Some(addr) = &identity.addr {
                config.broker.addr = addr.clone();
            }
            if let Some(port) = identity.port {
                config.broker.port = port;
            }
        }
        if !topics.is_empty() {
            config.broker.topics = topics.to_vec();
        }
        if !endpoints.is_empty() {
            config.coordination.endpoints = endpoints.clone();
        }
    }
}
