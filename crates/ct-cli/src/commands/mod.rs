//! CLI command implementations

mod check;
mod config;
mod connect;

use std::path::PathBuf;

use clap::Args;

pub use check::check_command;
pub use config::{config_init, config_path, config_show, load_client_config};
pub use connect::connect_command;

/// Host and credential flags shared by `connect` and `check`
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectArgs {
    /// Hosts to connect to (defaults to `hosts` from the config file)
    pub hosts: Vec<String>,

    /// Username for every host
    #[arg(short, long)]
    pub user: Option<String>,

    /// SSH port for every host
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Private key file to offer before the password
    #[arg(short, long, value_name = "FILE")]
    pub identity: Option<PathBuf>,

    /// Password (also answers keyboard-interactive prompts)
    #[arg(long, env = "CT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Never prompt for a password
    #[arg(long)]
    pub no_prompt: bool,

    /// Per-host connect timeout in seconds
    #[arg(short, long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Terminal type requested on every host
    #[arg(long)]
    pub term: Option<String>,
}
