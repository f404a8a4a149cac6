//! Keyward command-line inspector.

use anyhow::Result;
use clap::Parser;
use keyward_cli::cli::ConfigCommand;
use keyward_cli::handlers::{self, config, risk, status, watch};
use keyward_cli::{Cli, Commands};
use keyward_effects::{init_tracing, TaskRegistry};
use keyward_recovery::{RecoveryStateMachine, SyncSequencer};
use keyward_risk::FundsLostRiskWorker;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(if cli.verbose { "debug" } else { "warn" });

    let output = match &cli.command {
        Commands::Config(ConfigCommand::Check) => {
            handlers::render(&config::check(&cli.config)?, cli.json)?
        }

        Commands::Status(args) => {
            let config = config::load_config(&cli.config)?;
            let account = args.account.account_id()?;
            let effects = Arc::new(handlers::production_effects(
                &config,
                &account,
                args.account.token.as_deref(),
            )?);
            let machine =
                RecoveryStateMachine::new(effects, &config, Arc::new(SyncSequencer::new()));
            let rotations = status::rotation_reader(&machine, config.retry.clone());
            let report = status::collect(&machine, &rotations, &account, args.sync).await?;
            handlers::render(&report, cli.json)?
        }

        Commands::Risk(args) => {
            let config = config::load_config(&cli.config)?;
            let account = args.account.account_id()?;
            let effects = Arc::new(handlers::production_effects(
                &config,
                &account,
                args.account.token.as_deref(),
            )?);
            let source = Arc::new(args.signals.to_source());
            let report = risk::evaluate(effects, source, &account).await?;
            handlers::render(&report, cli.json)?
        }

        Commands::Watch(args) => {
            let config = config::load_config(&cli.config)?;
            let account = args.account.account_id()?;
            let effects = Arc::new(handlers::production_effects(
                &config,
                &account,
                args.account.token.as_deref(),
            )?);
            let machine = Arc::new(RecoveryStateMachine::new(
                effects.clone(),
                &config,
                Arc::new(SyncSequencer::new()),
            ));
            let risk = Arc::new(FundsLostRiskWorker::new(
                effects,
                Arc::new(args.risk.to_source()),
                account.clone(),
                Duration::from_millis(config.sync.risk_poll_interval_ms),
            ));
            let registry = TaskRegistry::new();
            let stop = async {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %err, "cannot listen for Ctrl-C");
                }
            };
            let json = cli.json;
            let print = |update: watch::WatchUpdate| match handlers::render(&update, json) {
                Ok(line) => println!("{line}"),
                Err(err) => tracing::warn!(error = %err, "cannot render update"),
            };
            watch::watch(&registry, machine, risk, &account, &config.sync, stop, print).await?;
            "watch stopped".to_string()
        }
    };

    println!("{output}");
    Ok(())
}
