use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// carepath consultation gateway
#[derive(Debug, Parser)]
#[command(name = "carepath", about = "Medical consultation pipeline and LLM gateway")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "carepath.toml", env = "CAREPATH_CONFIG")]
    pub config: PathBuf,

    /// Override the listen address
    #[arg(long, env = "CAREPATH_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Log filter directives (e.g. "info,carepath_consult=debug")
    #[arg(long, default_value = "info", env = "CAREPATH_LOG")]
    pub log: String,
}
