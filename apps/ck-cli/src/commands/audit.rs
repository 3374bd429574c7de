// audit.rs — Audit subcommands: verify, tail.

use std::path::PathBuf;

use clap::Subcommand;

use ck_audit::{AuditError, AuditLedger};

use crate::Context;

#[derive(Subcommand)]
pub enum AuditCommands {
    /// Verify the audit ledger hash chain.
    Verify {
        /// Path to the ledger (defaults to the configured audit log).
        #[arg(long)]
        log: Option<PathBuf>,
    },
    /// Show recent audit records.
    Tail {
        #[arg(long)]
        log: Option<PathBuf>,
        /// Number of records to show.
        #[arg(short, default_value = "10")]
        n: usize,
    },
}

pub fn execute(cmd: &AuditCommands, ctx: &Context) -> anyhow::Result<()> {
    match cmd {
        AuditCommands::Verify { log } => {
            let path = log.clone().unwrap_or_else(|| ctx.config.audit_log.clone());
            if !path.exists() {
                println!("No audit log found at {}", path.display());
                return Ok(());
            }
            match AuditLedger::verify_chain(&path) {
                Ok(count) => {
                    println!("Audit log verified: {} record(s), hash chain intact.", count);
                }
                Err(AuditError::IntegrityViolation {
                    line,
                    expected,
                    actual,
                }) => {
                    println!("INTEGRITY VIOLATION at line {}:", line);
                    println!("  Expected previous_hash: {}", expected);
                    println!("  Actual previous_hash:   {}", actual);
                    anyhow::bail!("audit log integrity check failed");
                }
                Err(e) => return Err(e.into()),
            }
        }

        AuditCommands::Tail { log, n } => {
            let path = log.clone().unwrap_or_else(|| ctx.config.audit_log.clone());
            if !path.exists() {
                println!("No audit log found at {}", path.display());
                return Ok(());
            }
            let records = AuditLedger::read_tail(&path, *n)?;
            if records.is_empty() {
                println!("No audit records.");
                return Ok(());
            }

            println!(
                "{:<20} {:<20} {:<22} {:<9} MESSAGE",
                "TIMESTAMP", "ACTION", "SUBJECT", "TIER"
            );
            println!("{}", "-".repeat(96));
            for record in records {
                println!(
                    "{:<20} {:<20} {:<22} {:<9} {}",
                    record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    record.action.to_string(),
                    record.subject,
                    record.risk_tier.as_deref().unwrap_or("-"),
                    record.message.as_deref().unwrap_or(""),
                );
            }
        }
    }

    Ok(())
}
