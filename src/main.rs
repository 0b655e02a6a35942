use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use vanity_sniper::config::{self, Config};

#[derive(Parser, Debug)]
#[command(name = "vanity-sniper", version, about = "Watch guild vanity codes and claim them when freed")]
struct Args {
    /// Path to config.json (defaults to the executable's directory)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let path = config::locate(args.config);
    let loaded = Config::load(&path);

    vanity_sniper::init_logging(loaded.as_ref().map(|c| c.debug).unwrap_or(false));

    let config = match loaded {
        Ok(config) => {
            tracing::info!("Configuration loaded from file: {}", path.display());
            config
        }
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match vanity_sniper::run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
