//! Sockudo HA client binary
//!
//! Resolves services through sentinels and runs one-shot commands against
//! their current primary or replicas.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use sockudo_ha::cli::{Cli, CliCommand, command_from_args, format_reply};
use sockudo_ha::logging::init_logging;
use sockudo_ha::{SentinelDirectory, TcpConnector};

#[tokio::main]
async fn main() -> ExitCode {
    let (config, command) = match Cli::parse().into_config() {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(&config) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let directory = match SentinelDirectory::connect(&config, Arc::new(TcpConnector::new())).await
    {
        Ok(directory) => directory,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let outcome = run(&directory, command).await;

    directory.close();
    if let Err(e) = directory.wait_closed().await {
        log::warn!("{}", e);
    }

    match outcome {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("(error) {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(directory: &SentinelDirectory, command: CliCommand) -> sockudo_ha::Result<String> {
    match command {
        CliCommand::Primary { service } => {
            Ok(directory.discover_primary(&service).await?.to_string())
        }
        CliCommand::Replicas { service } => Ok(directory
            .discover_alternates(&service)
            .await
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")),
        CliCommand::Masters => {
            let mut masters: Vec<_> = directory.monitors().await?.into_values().collect();
            masters.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(masters
                .iter()
                .map(|m| format!("{} {} {}", m.name, m.address(), m.flags))
                .collect::<Vec<_>>()
                .join("\n"))
        }
        CliCommand::Ckquorum { service } => Ok(if directory.check_quorum(&service).await? {
            "OK".to_string()
        } else {
            "NOQUORUM".to_string()
        }),
        CliCommand::Exec {
            service,
            replica,
            args,
        } => {
            let cmd = command_from_args(&args).ok_or_else(|| {
                sockudo_ha::Error::Config("exec needs a command".into())
            })?;
            let client = if replica {
                directory.alternate_for(&service, None)
            } else {
                directory.primary_for(&service, None)
            };
            let reply = client.execute(&cmd).await;
            client.close();
            if let Err(e) = client.wait_closed().await {
                log::debug!("{}", e);
            }
            Ok(format_reply(&reply?))
        }
    }
}
