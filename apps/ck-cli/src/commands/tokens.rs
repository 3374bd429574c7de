// tokens.rs — Token ledger subcommands: consume, prune, list.

use chrono::{Duration, Utc};
use clap::Subcommand;
use serde_json::json;

use ck_trust::ConsumedTokenStore;

use super::print_json;
use crate::Context;

#[derive(Subcommand)]
pub enum TokenCommands {
    /// Mark a token id as used. Fails if it was already consumed.
    Consume {
        token_id: String,
        /// Seconds until the record may be compacted.
        #[arg(long, default_value_t = 3600)]
        ttl: i64,
    },
    /// Compact expired records into tombstones.
    Prune,
    /// Show live records and the tombstone count.
    List,
}

pub fn execute(cmd: &TokenCommands, ctx: &Context) -> anyhow::Result<()> {
    let mut store = ConsumedTokenStore::open(&ctx.config.token_store)?;
    match cmd {
        TokenCommands::Consume { token_id, ttl } => {
            let expires_at = Utc::now() + Duration::seconds(*ttl);
            if !store.consume(token_id, expires_at)? {
                anyhow::bail!("token {} was already consumed", token_id);
            }
            print_json(&json!({ "token_id": token_id, "expires_at": expires_at }))
        }
        TokenCommands::Prune => {
            let pruned = store.prune_expired(Utc::now())?;
            print_json(&json!({
                "pruned": pruned,
                "live": store.len(),
                "tombstones": store.tombstone_count(),
            }))
        }
        TokenCommands::List => print_json(&json!({
            "tokens": store.records(),
            "tombstones": store.tombstone_count(),
        })),
    }
}
