use std::path::PathBuf;

use clap::Parser;
use diffdrive_runtime::config::DriveConfig;
use tracing_subscriber::EnvFilter;

/// Simulated differential drivetrain controlled over zenoh
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON file with drivetrain parameters (defaults for anything left out)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the control loop rate (Hz)
    #[arg(long)]
    loop_hz: Option<f64>,
}

fn load_config(args: &Args) -> Result<DriveConfig, Box<dyn std::error::Error + Send + Sync>> {
    let mut config = match &args.config {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => DriveConfig::default(),
    };
    if let Some(hz) = args.loop_hz {
        config.loop_hz = hz;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init(); // installs the subscriber globally

    let args = Args::parse();
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = diffdrive_runtime::runtime::run(config).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
