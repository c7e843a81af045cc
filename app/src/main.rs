mod cli;
mod config;
mod cover_cmd;
mod detect_cmd;
mod logging;
mod redact_cmd;
mod shared;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;

use cli::{Cli, Commands};
use config::AppConfig;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        tracing::error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let ignored = config.apply_env(|key| std::env::var(key).ok());

    logging::init(&config.log)?;
    for key in ignored {
        tracing::warn!("忽略 {} 中的无效值", key);
    }

    match cli.command {
        Commands::Redact {
            ref input,
            ref redactions,
            ref output,
        } => print_json(&redact_cmd::run(&config, input, redactions, output.as_deref())?),
        Commands::Detect {
            ref input,
            ref existing,
            confidence,
        } => {
            let confidence = shared::resolve_confidence(confidence, &config)?;
            let detector = shared::build_detector(&config)?;
            print_json(&detect_cmd::run(&detector, input, existing.as_deref(), confidence)?)
        }
        Commands::CoverSignatures {
            ref input,
            ref existing,
            confidence,
            no_detect,
            ref output,
        } => {
            let confidence = shared::resolve_confidence(confidence, &config)?;
            let detector = if no_detect {
                None
            } else {
                Some(shared::build_detector(&config)?)
            };
            print_json(&cover_cmd::run(
                detector.as_ref(),
                input,
                existing.as_deref(),
                confidence,
                output.as_deref(),
            )?)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
