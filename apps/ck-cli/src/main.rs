//! # ck-cli
//!
//! Command-line interface to the capability kernel.
//!
//! - `ck assess <action>`: score an action and show the approval it needs
//! - `ck plan <action>`: build and sign the tool plan without running it
//! - `ck execute <action>`: run an action through the kernel (dry-run executor)
//! - `ck tokens consume|prune`: operate the consumed-token ledger
//! - `ck trust show`: print the current key version and trust epoch
//! - `ck audit verify|tail`: inspect the hash-chained audit ledger
//!
//! Results are printed as JSON on stdout; logs go to stderr.

mod commands;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ck_kernel::KernelConfig;
use ck_plan::SigningKey;

/// Capability kernel CLI: assess, plan and execute device actions.
#[derive(Parser)]
#[command(name = "ck", version, about)]
struct Cli {
    /// Directory holding trust state, token ledger and audit log.
    #[arg(long, default_value = ".ck", global = true)]
    state_dir: PathBuf,

    /// Kernel config file (defaults to <state-dir>/kernel.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    /// Plan-signing key version.
    #[arg(long, default_value_t = 1, global = true)]
    key_version: u64,

    /// Plan-signing secret.
    #[arg(long, env = "CK_SIGNING_SECRET", hide_env_values = true, global = true)]
    key_secret: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score an action and show the policy decision, without side effects.
    Assess(commands::assess::ActionArgs),
    /// Build and sign the tool plan for an action.
    Plan(commands::assess::ActionArgs),
    /// Run an action through the kernel.
    Execute(commands::execute::ExecuteArgs),
    /// Operate the consumed-token ledger.
    Tokens {
        #[command(subcommand)]
        command: commands::tokens::TokenCommands,
    },
    /// Inspect trust state.
    Trust {
        #[command(subcommand)]
        command: commands::trust::TrustCommands,
    },
    /// Inspect the audit ledger.
    Audit {
        #[command(subcommand)]
        command: commands::audit::AuditCommands,
    },
}

/// Settings every subcommand may need.
pub struct Context {
    pub config: KernelConfig,
    key_version: u64,
    key_secret: Option<String>,
}

impl Context {
    /// The plan-signing key. Only plan and execute need one.
    pub fn signing_key(&self) -> anyhow::Result<SigningKey> {
        let secret = self
            .key_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .context("a signing secret is required (--key-secret or CK_SIGNING_SECRET)")?;
        Ok(SigningKey::new(self.key_version, secret.as_bytes()))
    }
}

fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive("ck_kernel=info".parse()?)
        .add_directive("ck_cli=info".parse()?);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json)?;

    let config = match &cli.config {
        Some(path) => KernelConfig::load(path)
            .with_context(|| format!("loading kernel config {}", path.display()))?,
        None => KernelConfig::discover(&cli.state_dir)?,
    };
    let ctx = Context {
        config,
        key_version: cli.key_version,
        key_secret: cli.key_secret,
    };

    match &cli.command {
        Commands::Assess(args) => commands::assess::assess(args, &ctx),
        Commands::Plan(args) => commands::assess::plan(args, &ctx),
        Commands::Execute(args) => commands::execute::execute(args, &ctx),
        Commands::Tokens { command } => commands::tokens::execute(command, &ctx),
        Commands::Trust { command } => commands::trust::execute(command, &ctx),
        Commands::Audit { command } => commands::audit::execute(command, &ctx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "ck",
            "assess",
            "send_email",
            "--target",
            "bob@example.org",
            "--state-dir",
            "/tmp/ck",
        ])
        .unwrap();
        assert_eq!(cli.state_dir, PathBuf::from("/tmp/ck"));
        assert!(matches!(cli.command, Commands::Assess(_)));
    }

    #[test]
    fn missing_secret_is_reported() {
        let ctx = Context {
            config: KernelConfig::for_state_dir("/tmp/ck"),
            key_version: 1,
            key_secret: None,
        };
        let err = ctx.signing_key().unwrap_err();
        assert!(err.to_string().contains("signing secret"));
    }
}
