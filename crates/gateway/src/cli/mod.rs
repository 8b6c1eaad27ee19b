use clap::{Parser, Subcommand};

/// trackerd — task tracker, pipeline dispatcher and tool run supervisor.
#[derive(Debug, Parser)]
#[command(name = "trackerd", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start both HTTP surfaces (default when no subcommand is given).
    Serve,
    /// Print the version and exit.
    Version,
}

/// Load configuration from the path named by `TRACKER_CONFIG` (default
/// `config.toml`), falling back to built-in defaults if that file is
/// absent.
pub fn load_config() -> anyhow::Result<(tr_domain::config::Config, String)> {
    let config_path = std::env::var("TRACKER_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let config = if std::path::Path::new(&config_path).exists() {
        let raw = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("reading {config_path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {config_path}: {e}"))?
    } else {
        tr_domain::config::Config::default()
    };

    Ok((config, config_path))
}
