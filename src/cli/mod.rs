pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{ConnectionConfig, DriverConfig};
use crate::error::Result;

#[derive(Parser)]
#[command(name = "ionoscloud-machine")]
#[command(version)]
#[command(about = "Provision and manage IONOS Cloud machines")]
#[command(long_about = "Creates servers with their datacenter, LAN, volume, NICs and optional NAT gateway on IONOS Cloud, and tears everything down again.\n\nCredentials are read from --username/--password or --token, or from the matching IONOSCLOUD_* environment variables.")]
pub struct Cli {
    #[command(flatten)]
    pub connection: ConnectionConfig,

    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a machine configuration against the cloud without creating anything
    Check {
        /// Machine name
        name: String,

        /// Read the machine configuration from a YAML file instead of flags
        #[arg(short, long = "config")]
        config_file: Option<PathBuf>,

        #[command(flatten)]
        config: Box<DriverConfig>,
    },

    /// Create a new machine
    Create {
        /// Machine name
        name: String,

        /// Read the machine configuration from a YAML file instead of flags
        #[arg(short, long = "config")]
        config_file: Option<PathBuf>,

        #[command(flatten)]
        config: Box<DriverConfig>,
    },

    /// Remove a machine and every resource created for it
    Remove {
        name: String,

        /// Remove without confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// Start a stopped machine
    Start { name: String },

    /// Stop a running machine
    Stop { name: String },

    /// Reboot a machine
    Restart { name: String },

    /// Stop a machine without checking its state
    Kill { name: String },

    /// Print the machine's IP address
    Ip { name: String },

    /// Print the hostname to SSH into
    SshHostname { name: String },

    /// Print the docker daemon URL
    Url { name: String },

    /// Print the machine state
    State { name: String },

    /// List machines created from this host
    Ls,
}

/// Flags, or the YAML file when one is given
fn machine_config(config: Box<DriverConfig>, config_file: Option<PathBuf>) -> Result<DriverConfig> {
    match config_file {
        Some(path) => DriverConfig::load(&path),
        None => Ok(*config),
    }
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let connection = self.connection;

        match self.command {
            Commands::Check {
                name,
                config_file,
                config,
            } => {
                let config = machine_config(config, config_file)?;
                commands::create::check(&connection, &name, &config).await
            }
            Commands::Create {
                name,
                config_file,
                config,
            } => {
                let config = machine_config(config, config_file)?;
                commands::create::execute(&connection, &name, &config).await
            }
            Commands::Remove { name, force } => {
                commands::remove::execute(&connection, &name, force).await
            }
            Commands::Start { name } => commands::lifecycle::start(&connection, &name).await,
            Commands::Stop { name } => commands::lifecycle::stop(&connection, &name).await,
            Commands::Restart { name } => commands::lifecycle::restart(&connection, &name).await,
            Commands::Kill { name } => commands::lifecycle::kill(&connection, &name).await,
            Commands::Ip { name } => commands::lifecycle::ip(&name),
            Commands::SshHostname { name } => commands::lifecycle::ssh_hostname(&name),
            Commands::Url { name } => commands::lifecycle::url(&connection, &name).await,
            Commands::State { name } => commands::lifecycle::state(&connection, &name).await,
            Commands::Ls => commands::lifecycle::list(),
        }
    }
}
