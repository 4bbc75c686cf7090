//! Persisted giveaway state records.
//!
//! Everything the coordinator durably owns: the active-holder record, the
//! channel lock flag, the notified-user set, the referral map and the
//! per-user bonus ledger. Id-keyed maps persist as entry vectors so the
//! JSON encoding round-trips exactly.

use crate::chat::{MessageId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// The single piece of mutable core state: who holds the active slot,
/// until when, and which messages anchor it. Exists iff a countdown is
/// running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderRecord {
    pub user: UserId,
    pub deadline: DateTime<Utc>,
    /// The target message the holder replied to (sanity/reference only)
    pub source_message: MessageId,
    /// The bot-authored live countdown message, edited in place. Absent
    /// when the platform refused the post; the countdown runs regardless.
    pub status_message: Option<MessageId>,
}

/// Per-user bonus accumulators. Created lazily, never deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBonusStats {
    pub invites_applied: u64,
    pub invite_seconds_applied: i64,
    pub role_bonuses_applied: u64,
    pub role_seconds_applied: i64,
}

impl UserBonusStats {
    pub fn total_seconds(&self) -> i64 {
        self.invite_seconds_applied + self.role_seconds_applied
    }
}

/// Referral attribution for an invitee. `role_bonus_applied` flips to true
/// exactly once, when the role bonus is actually credited to the inviter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralRecord {
    pub inviter_id: UserId,
    pub role_bonus_applied: bool,
}

/// Channel lock flag, set at winner declaration
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LockFlag {
    pub locked: bool,
}

/// Persisted form of the notified-user set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifiedUsers {
    pub ids: Vec<UserId>,
}

impl NotifiedUsers {
    pub fn from_set(set: &HashSet<UserId>) -> Self {
        let mut ids: Vec<UserId> = set.iter().copied().collect();
        ids.sort_by_key(|id| id.0);
        Self { ids }
    }

    pub fn into_set(self) -> HashSet<UserId> {
        self.ids.into_iter().collect()
    }
}

/// Persisted form of the invitee -> referral map
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReferralTable {
    pub entries: Vec<(UserId, ReferralRecord)>,
}

impl ReferralTable {
    pub fn from_map(map: &HashMap<UserId, ReferralRecord>) -> Self {
        let mut entries: Vec<_> = map.iter().map(|(k, v)| (*k, v.clone())).collect();
        entries.sort_by_key(|(id, _)| id.0);
        Self { entries }
    }

    pub fn into_map(self) -> HashMap<UserId, ReferralRecord> {
        self.entries.into_iter().collect()
    }
}

/// Persisted form of the per-user bonus ledger
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BonusLedger {
    pub entries: Vec<(UserId, UserBonusStats)>,
}

impl BonusLedger {
    pub fn from_map(map: &HashMap<UserId, UserBonusStats>) -> Self {
        let mut entries: Vec<_> = map.iter().map(|(k, v)| (*k, *v)).collect();
        entries.sort_by_key(|(id, _)| id.0);
        Self { entries }
    }

    pub fn into_map(self) -> HashMap<UserId, UserBonusStats> {
        self.entries.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_notified_set_roundtrip() {
        let set: HashSet<UserId> = [UserId(3), UserId(1), UserId(2)].into_iter().collect();
        let table = NotifiedUsers::from_set(&set);
        assert_eq!(table.ids, vec![UserId(1), UserId(2), UserId(3)]);
        assert_eq!(table.into_set(), set);
    }

    proptest! {
        #[test]
        fn prop_bonus_ledger_json_roundtrip(entries in proptest::collection::hash_map(
            any::<u64>(),
            (any::<u64>(), 0i64..1_000_000, any::<u64>(), 0i64..1_000_000),
            0..16,
        )) {
            let map: HashMap<UserId, UserBonusStats> = entries
                .into_iter()
                .map(|(id, (inv, inv_s, role, role_s))| {
                    (UserId(id), UserBonusStats {
                        invites_applied: inv,
                        invite_seconds_applied: inv_s,
                        role_bonuses_applied: role,
                        role_seconds_applied: role_s,
                    })
                })
                .collect();
            let ledger = BonusLedger::from_map(&map);
            let encoded = serde_json::to_string(&ledger).unwrap();
            let decoded: BonusLedger = serde_json::from_str(&encoded).unwrap();
            prop_assert_eq!(decoded.into_map(), map);
        }

        #[test]
        fn prop_referral_table_json_roundtrip(entries in proptest::collection::hash_map(
            any::<u64>(), (any::<u64>(), any::<bool>()), 0..16,
        )) {
            let map: HashMap<UserId, ReferralRecord> = entries
                .into_iter()
                .map(|(id, (inviter, applied))| {
                    (UserId(id), ReferralRecord {
                        inviter_id: UserId(inviter),
                        role_bonus_applied: applied,
                    })
                })
                .collect();
            let table = ReferralTable::from_map(&map);
            let encoded = serde_json::to_string(&table).unwrap();
            let decoded: ReferralTable = serde_json::from_str(&encoded).unwrap();
            prop_assert_eq!(decoded.into_map(), map);
        }
    }
}
