//! Show the persisted giveaway state.

use super::config::{default_config_path, HoldoutConfig};
use chrono::Utc;
use holdout::giveaway::state::{BonusLedger, HolderRecord, LockFlag, ReferralTable};
use holdout::store::{keys, StateStore};
use std::path::PathBuf;

pub async fn execute(config_path: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config_path
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let config = HoldoutConfig::load(&config_path)?;
    let store = StateStore::open(&config.storage.db_path).await?;

    println!("📊 Holdout Giveaway Status");
    println!();

    let locked = store
        .get::<LockFlag>(keys::CHANNEL_LOCKED)
        .await
        .map(|flag| flag.locked)
        .unwrap_or(false);
    println!(
        "  Channel: {}",
        if locked { "locked 🔒" } else { "open" }
    );

    match store.get::<HolderRecord>(keys::ACTIVE_HOLDER).await {
        Some(holder) => {
            let remaining = (holder.deadline - Utc::now()).num_seconds();
            println!("  Active holder: user {}", holder.user);
            println!(
                "  Deadline: {} ({}s remaining)",
                holder.deadline.format("%Y-%m-%d %H:%M:%S UTC"),
                remaining.max(0)
            );
            match holder.status_message {
                Some(message) => println!("  Status message: {}", message),
                None => println!("  Status message: none"),
            }
        }
        None => println!("  Active holder: none"),
    }

    let ledger = store
        .get::<BonusLedger>(keys::USER_STATS)
        .await
        .unwrap_or_default();
    println!("  Users with bonus credits: {}", ledger.entries.len());

    let referrals = store
        .get::<ReferralTable>(keys::REFERRALS)
        .await
        .unwrap_or_default();
    println!("  Tracked referrals: {}", referrals.entries.len());

    Ok(())
}
