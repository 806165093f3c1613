mod config;
mod observability;

use clap::{Args, Parser};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(version, about = "Upserts CRM contacts from parsed-email signup webhooks")]
enum CliCommand {
    /// Serve the webhook and admin listeners
    Run(ConfigArgs),
    /// Load and validate a config file, then exit
    ValidateConfig(ConfigArgs),
}

#[derive(Args)]
struct ConfigArgs {
    #[arg(long)]
    config_file_path: PathBuf,
}

fn main() -> ExitCode {
    let cli = CliCommand::parse();

    match cli {
        CliCommand::Run(args) => {
            let Some(config) = load_config(&args) else {
                return ExitCode::FAILURE;
            };
            let guard = observability::init(&config.common);
            let result = run(config);
            if let Err(e) = &result {
                tracing::error!(error = %e, "signup-sync stopped");
            }
            // Flushes queued Sentry events before the process exits.
            drop(guard);
            match result {
                Ok(()) => ExitCode::SUCCESS,
                Err(_) => ExitCode::FAILURE,
            }
        }
        CliCommand::ValidateConfig(args) => match load_config(&args) {
            Some(_) => {
                println!("{} is valid", args.config_file_path.display());
                ExitCode::SUCCESS
            }
            None => ExitCode::FAILURE,
        },
    }
}

fn load_config(args: &ConfigArgs) -> Option<config::Config> {
    config::Config::from_file(&args.config_file_path)
        .inspect_err(|e| eprintln!("{}: {e}", args.config_file_path.display()))
        .ok()
}

fn run(config: config::Config) -> Result<(), contact_upsert::ContactUpsertError> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    tracing::info!("Starting signup-sync");
    rt.block_on(contact_upsert::run(config.contact_upsert))
}
