#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::path::PathBuf;

use clap::Parser;

/// Reliable message dispatch across unreliable backends
#[derive(Parser, Debug)]
#[command(name = "herald")]
#[command(about = "Dispatch messages through retrying, circuit-broken backends", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file (RON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Submit this many demo messages, wait for them to be delivered, then exit
    #[arg(short, long, value_name = "COUNT")]
    demo: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let herald = match find_config_file(cli.config)? {
        Some(config_path) => {
            let config_content = std::fs::read_to_string(&config_path).map_err(|e| {
                anyhow::anyhow!(
                    "Failed to read config from {}: {}",
                    config_path.display(),
                    e
                )
            })?;
            ron::from_str(&config_content)?
        }
        None => herald::controller::Herald::default(),
    };

    herald.run(cli.demo).await
}

/// Find the configuration file using the following precedence:
/// 1. `--config` on the command line
/// 2. `HERALD_CONFIG` environment variable
/// 3. ./herald.config.ron (current working directory)
/// 4. /etc/herald/herald.config.ron (system-wide config)
///
/// Returns `None` when no file is found, in which case the built-in defaults
/// are used.
fn find_config_file(explicit: Option<PathBuf>) -> anyhow::Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(Some(path));
        }
        anyhow::bail!("--config points to non-existent file: {}", path.display());
    }

    if let Ok(env_path) = std::env::var("HERALD_CONFIG") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(Some(path));
        }
        anyhow::bail!(
            "HERALD_CONFIG points to non-existent file: {}",
            path.display()
        );
    }

    let default_paths = [
        PathBuf::from("./herald.config.ron"),
        PathBuf::from("/etc/herald/herald.config.ron"),
    ];

    Ok(default_paths.into_iter().find(|path| path.exists()))
}
