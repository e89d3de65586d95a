mod config;
mod observability;

use clap::{Args, Parser};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "mlgate", version, about = "Authenticating gateway for the ML tracking server")]
enum CliCommand {
    /// Run the gateway
    Gateway(ConfigArgs),
    /// Load and validate a config file, then exit
    CheckConfig(ConfigArgs),
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[arg(long)]
    config_file_path: PathBuf,
}

fn main() -> ExitCode {
    let cli = CliCommand::parse();

    match cli {
        CliCommand::Gateway(args) => run_gateway(&args),
        CliCommand::CheckConfig(args) => check_config(&args),
    }
}

fn load_gateway_config(
    args: &ConfigArgs,
) -> Result<(config::CommonConfig, proxy::config::Config), String> {
    let config = config::Config::from_file(&args.config_file_path).map_err(|e| e.to_string())?;
    let gateway = config
        .gateway
        .ok_or_else(|| "config has no gateway section".to_string())?;
    gateway.validate().map_err(|e| e.to_string())?;
    Ok((config.common, gateway))
}

fn check_config(args: &ConfigArgs) -> ExitCode {
    match load_gateway_config(args) {
        Ok(_) => {
            println!("{}: ok", args.config_file_path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {e}", args.config_file_path.display());
            ExitCode::FAILURE
        }
    }
}

fn run_gateway(args: &ConfigArgs) -> ExitCode {
    let (common, gateway) = match load_gateway_config(args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Invalid config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _guard = match observability::init(&common) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize observability: {e}");
            return ExitCode::FAILURE;
        }
    };

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "failed to build runtime");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting mlgate");
    match rt.block_on(proxy::run(gateway)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "gateway stopped");
            ExitCode::FAILURE
        }
    }
}
