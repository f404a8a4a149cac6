//! Command-line definitions.

use clap::{Args, Parser, Subcommand, ValueEnum};
use keyward_core::AccountId;
use keyward_risk::{CloudBackupHealth, ContactKind, ContactMethod, StaticRiskSignals};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "keyward")]
#[command(about = "Keyward - delay-and-notify recovery inspector", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path
    #[arg(short, long, global = true, default_value = "keyward.toml")]
    pub config: PathBuf,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the keybox, recovery and pending rotation of an account
    Status(StatusArgs),

    /// Evaluate the funds-lost risk of an account
    Risk(RiskArgs),

    /// Run the recovery sync and risk workers and print changes until Ctrl-C
    Watch(WatchArgs),

    /// Configuration file commands
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Args)]
pub struct AccountArgs {
    /// Server account id
    #[arg(short, long)]
    pub account: String,

    /// Bearer token for co-signer requests; without it only local state is read
    #[arg(long)]
    pub token: Option<String>,
}

impl AccountArgs {
    pub fn account_id(&self) -> anyhow::Result<AccountId> {
        Ok(AccountId::new(self.account.clone())?)
    }
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    #[command(flatten)]
    pub account: AccountArgs,

    /// Reconcile with the co-signer before reporting
    #[arg(long)]
    pub sync: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackupArg {
    Healthy,
    Missing,
    Problem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ContactArg {
    Email,
    Phone,
}

#[derive(Debug, Args)]
pub struct RiskArgs {
    #[command(flatten)]
    pub account: AccountArgs,

    #[command(flatten)]
    pub signals: RiskSignalArgs,
}

/// Signals that live outside the wallet core, as reported by the operator.
#[derive(Debug, Args)]
pub struct RiskSignalArgs {
    /// A hardware device is paired
    #[arg(long)]
    pub hardware_linked: bool,

    /// Cloud backup state
    #[arg(long, value_enum, default_value = "missing")]
    pub backup: BackupArg,

    /// Verified contact method on file (repeatable)
    #[arg(long = "contact", value_enum)]
    pub contacts: Vec<ContactArg>,
}

impl RiskSignalArgs {
    pub fn to_source(&self) -> StaticRiskSignals {
        let backup = match self.backup {
            BackupArg::Healthy => CloudBackupHealth::Healthy,
            BackupArg::Missing => CloudBackupHealth::Missing,
            BackupArg::Problem => CloudBackupHealth::Problem {
                reason: "reported by operator".to_string(),
            },
        };
        let contacts = self
            .contacts
            .iter()
            .map(|contact| {
                ContactMethod::verified(match contact {
                    ContactArg::Email => ContactKind::Email,
                    ContactArg::Phone => ContactKind::Phone,
                })
            })
            .collect();
        StaticRiskSignals::new(self.hardware_linked, backup, contacts)
    }
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    #[command(flatten)]
    pub account: AccountArgs,

    #[command(flatten)]
    pub risk: RiskSignalArgs,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Validate the config file and print the effective settings
    Check,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_risk_flags() {
        let cli = Cli::try_parse_from([
            "keyward",
            "--json",
            "risk",
            "--account",
            "urn:wallet-account:1",
            "--hardware-linked",
            "--backup",
            "healthy",
            "--contact",
            "email",
            "--contact",
            "phone",
        ])
        .unwrap();
        assert!(cli.json);
        let Commands::Risk(args) = cli.command else {
            panic!("expected risk command");
        };
        assert!(args.signals.hardware_linked);
        assert_eq!(args.signals.backup, BackupArg::Healthy);
        assert_eq!(
            args.signals.contacts,
            vec![ContactArg::Email, ContactArg::Phone]
        );
    }

    #[test]
    fn watch_takes_account_and_signal_flags() {
        let cli = Cli::try_parse_from([
            "keyward",
            "watch",
            "-a",
            "urn:wallet-account:1",
            "--token",
            "secret",
            "--contact",
            "phone",
        ])
        .unwrap();
        let Commands::Watch(args) = cli.command else {
            panic!("expected watch command");
        };
        assert_eq!(args.account.token.as_deref(), Some("secret"));
        assert!(!args.risk.hardware_linked);
        assert_eq!(args.risk.backup, BackupArg::Missing);
        assert_eq!(args.risk.contacts, vec![ContactArg::Phone]);
    }

    #[test]
    fn status_defaults_to_local_only() {
        let cli =
            Cli::try_parse_from(["keyward", "status", "-a", "urn:wallet-account:1"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("keyward.toml"));
        let Commands::Status(args) = cli.command else {
            panic!("expected status command");
        };
        assert!(!args.sync);
        assert_eq!(args.account.token, None);
    }
}
