// trust.rs — `ck trust show`.

use clap::Subcommand;

use ck_trust::{TrustEpochManager, TrustState};

use super::print_json;
use crate::Context;

#[derive(Subcommand)]
pub enum TrustCommands {
    /// Print the active key version, trust epoch and revoked versions.
    Show,
}

pub fn execute(cmd: &TrustCommands, ctx: &Context) -> anyhow::Result<()> {
    match cmd {
        TrustCommands::Show => {
            let path = &ctx.config.trust_state;
            if !path.exists() {
                eprintln!("No trust state at {} (defaults apply on first use)", path.display());
                return print_json(&TrustState::default());
            }
            let trust = TrustEpochManager::open(path, TrustState::default())?;
            trust.verify_integrity()?;
            print_json(trust.state())
        }
    }
}
