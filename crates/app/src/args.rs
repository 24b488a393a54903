pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "trellis")]
#[command(about = "Manage trellis key stores and inspect signed documents")]
pub struct Args {
    /// Path to the trellis state directory (defaults to ~/.trellis)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    /// Storage password protecting the key store
    #[arg(long, global = true, env = "TRELLIS_STORAGE_PASSWORD", hide_env_values = true)]
    pub storage_password: Option<String>,

    /// Log level for stderr output (RUST_LOG takes precedence)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: crate::Command,
}
