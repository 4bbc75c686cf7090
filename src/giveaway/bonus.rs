//! Bonus/Referral Engine
//!
//! Credits the *current holder* with deadline reductions:
//! - invite bonus, when a member they invited joins (and the invitee's
//!   account is old enough)
//! - role bonus, when a previously ineligible invitee later gains the
//!   eligibility role
//!
//! `reduce_active_time` is the single mutation point both paths share:
//! it validates the target user is the current holder, subtracts, floors
//! the deadline at now, refreshes the status message and persists. All of
//! it runs under the same session mutex as the state machine.

use super::messages;
use super::session::{best_effort, GiveawaySession, SessionState};
use super::state::ReferralRecord;
use crate::chat::{ChatGateway, Member, RoleId, UserId};
use chrono::{Duration, Utc};
use tracing::{debug, info};

impl<C: ChatGateway> GiveawaySession<C> {
    /// Reduce the active holder's remaining time. No-op unless `user` is
    /// the current holder; the deadline never drops below now.
    pub async fn reduce_active_time(&self, user: UserId, seconds: i64) {
        let mut st = self.inner.lock().await;
        self.reduce_active_time_locked(&mut st, user, seconds).await;
    }

    /// Returns true when a reduction was applied.
    async fn reduce_active_time_locked(
        &self,
        st: &mut SessionState,
        user: UserId,
        seconds: i64,
    ) -> bool {
        if seconds <= 0 {
            return false;
        }
        let Some(holder) = st.holder.as_mut() else {
            return false;
        };
        if holder.user != user {
            return false;
        }

        let now = Utc::now();
        let mut deadline = holder.deadline - Duration::seconds(seconds);
        if deadline < now {
            deadline = now;
        }
        holder.deadline = deadline;
        let remaining = (deadline - now).num_seconds();
        let holder = holder.clone();

        if let Some(status) = holder.status_message {
            let stats = st.stats.get(&user).copied().unwrap_or_default();
            best_effort(
                "bonus status update",
                self.client
                    .edit_message(
                        self.config.channel,
                        status,
                        &messages::countdown(user, remaining, &stats),
                    )
                    .await,
            );
        }
        self.persist_holder(Some(&holder)).await;
        info!(user = %user, seconds, remaining, "active time reduced");
        true
    }

    /// Credit `inviter` with `invite_count` successful invites. No-op when
    /// the bonus is disabled or the inviter is not the current holder.
    pub async fn apply_invite_bonus(&self, inviter: UserId, invite_count: u64) {
        let mut st = self.inner.lock().await;
        self.apply_invite_bonus_locked(&mut st, inviter, invite_count)
            .await;
    }

    async fn apply_invite_bonus_locked(
        &self,
        st: &mut SessionState,
        inviter: UserId,
        invite_count: u64,
    ) -> bool {
        if invite_count == 0 || self.config.invite_bonus_seconds <= 0 {
            return false;
        }
        let seconds = self.config.invite_bonus_seconds * invite_count as i64;
        if !self.reduce_active_time_locked(st, inviter, seconds).await {
            return false;
        }
        let stats = st.stats.entry(inviter).or_default();
        stats.invites_applied += invite_count;
        stats.invite_seconds_applied += seconds;
        self.persist_stats(st).await;
        true
    }

    /// Credit `inviter` with one role-grant bonus. Same holder gating as
    /// the invite bonus.
    pub async fn apply_role_bonus(&self, inviter: UserId) {
        let mut st = self.inner.lock().await;
        self.apply_role_bonus_locked(&mut st, inviter).await;
    }

    async fn apply_role_bonus_locked(&self, st: &mut SessionState, inviter: UserId) -> bool {
        let seconds = self.config.role_bonus_seconds;
        if seconds <= 0 {
            return false;
        }
        if !self.reduce_active_time_locked(st, inviter, seconds).await {
            return false;
        }
        let stats = st.stats.entry(inviter).or_default();
        stats.role_bonuses_applied += 1;
        stats.role_seconds_applied += seconds;
        self.persist_stats(st).await;
        true
    }

    /// A member joined the guild. Work out which invite they used from the
    /// usage delta, attribute the referral to the inviter and apply the
    /// join-time invite bonus if the inviter currently holds the slot.
    pub(crate) async fn handle_member_join(&self, member: Member) {
        let invites = match self.client.list_invites().await {
            Ok(list) => list,
            Err(err) => {
                debug!(%err, "cannot enumerate invites for join attribution");
                return;
            }
        };

        let mut st = self.inner.lock().await;
        let mut used: Option<(u64, Option<UserId>)> = None;
        for invite in &invites {
            let previous = st.invite_uses.get(&invite.code).copied().unwrap_or(0);
            if invite.uses > previous {
                used = Some((invite.uses - previous, invite.inviter));
                break;
            }
        }
        st.invite_uses = invites.into_iter().map(|i| (i.code, i.uses)).collect();

        let Some((usage_delta, Some(inviter))) = used else {
            return;
        };
        if self.client.fetch_member(inviter).await.is_err() {
            debug!(inviter = %inviter, "inviter no longer a member, ignoring join");
            return;
        }

        // Young accounts do not count for any bonus.
        if self.config.min_account_age_days > 0 {
            let age = Utc::now().signed_duration_since(member.created_at);
            if age < Duration::days(self.config.min_account_age_days) {
                debug!(user = %member.id, "invitee account too young for bonus");
                return;
            }
        }

        st.referrals.insert(
            member.id,
            ReferralRecord {
                inviter_id: inviter,
                role_bonus_applied: false,
            },
        );
        self.persist_referrals(&st).await;

        self.apply_invite_bonus_locked(&mut st, inviter, usage_delta)
            .await;
    }

    /// A member's roles changed. When a referred invitee transitions from
    /// ineligible to eligible, credit the inviter with the role bonus —
    /// but only if the inviter is the current holder. Otherwise the
    /// referral stays unflagged so the bonus remains available on a later
    /// occasion.
    pub(crate) async fn handle_role_update(&self, member: &Member, previous_roles: &[RoleId]) {
        let had_role = self.config.is_eligible(previous_roles);
        let has_role = self.config.is_eligible(&member.roles);
        if had_role || !has_role {
            return;
        }

        let mut st = self.inner.lock().await;
        let Some(record) = st.referrals.get(&member.id) else {
            return;
        };
        if record.role_bonus_applied {
            return;
        }
        let inviter = record.inviter_id;
        if self.client.fetch_member(inviter).await.is_err() {
            return;
        }

        let applied = self.apply_role_bonus_locked(&mut st, inviter).await;
        if applied {
            if let Some(record) = st.referrals.get_mut(&member.id) {
                record.role_bonus_applied = true;
            }
            self.persist_referrals(&st).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::session::test_support::*;
    use crate::chat::{ChatEvent, InviteInfo, UserId};
    use chrono::{Duration as ChronoDuration, Utc};

    #[tokio::test]
    async fn test_reduce_only_affects_current_holder() {
        let (session, client) = session().await;
        let alice = member(1, &[3]);
        client.add_member(alice.clone());

        session.start_or_takeover(&alice, TARGET, None, None).await;
        let before = session.current_holder().await.unwrap().deadline;

        // bonus for somebody else: no change
        session.reduce_active_time(UserId(2), 10).await;
        assert_eq!(session.current_holder().await.unwrap().deadline, before);

        session.reduce_active_time(UserId(1), 10).await;
        let after = session.current_holder().await.unwrap().deadline;
        assert_eq!((before - after).num_seconds(), 10);
    }

    #[tokio::test]
    async fn test_reduce_floors_at_now() {
        let (session, _client) = session().await;
        let alice = member(1, &[3]);

        session.start_or_takeover(&alice, TARGET, None, None).await;
        session.reduce_active_time(UserId(1), 100_000).await;

        let deadline = session.current_holder().await.unwrap().deadline;
        assert!(deadline <= Utc::now());
        assert!(deadline > Utc::now() - ChronoDuration::seconds(2));
    }

    #[tokio::test]
    async fn test_invite_bonus_updates_counters() {
        let (session, _client) = session().await;
        let alice = member(1, &[3]);

        session.start_or_takeover(&alice, TARGET, None, None).await;
        let before = session.current_holder().await.unwrap().deadline;

        session.apply_invite_bonus(UserId(1), 2).await;

        let after = session.current_holder().await.unwrap().deadline;
        assert_eq!((before - after).num_seconds(), 20);
        let stats = session.bonus_stats(UserId(1)).await;
        assert_eq!(stats.invites_applied, 2);
        assert_eq!(stats.invite_seconds_applied, 20);
    }

    #[tokio::test]
    async fn test_invite_bonus_noop_when_not_holder() {
        let (session, _client) = session().await;
        let alice = member(1, &[3]);

        session.start_or_takeover(&alice, TARGET, None, None).await;
        session.apply_invite_bonus(UserId(9), 3).await;

        let stats = session.bonus_stats(UserId(9)).await;
        assert_eq!(stats.invites_applied, 0);
        assert_eq!(stats.invite_seconds_applied, 0);
    }

    #[tokio::test]
    async fn test_member_join_attributes_referral_and_applies_bonus() {
        let (session, client) = session().await;
        let alice = member(1, &[3]);
        client.add_member(alice.clone());

        client.set_invites(vec![InviteInfo {
            code: "abc".to_string(),
            uses: 0,
            inviter: Some(UserId(1)),
        }]);
        session.dispatch(ChatEvent::Connected).await;

        session.start_or_takeover(&alice, TARGET, None, None).await;
        let before = session.current_holder().await.unwrap().deadline;

        client.set_invites(vec![InviteInfo {
            code: "abc".to_string(),
            uses: 1,
            inviter: Some(UserId(1)),
        }]);
        let invitee = member(50, &[]);
        session.dispatch(ChatEvent::MemberJoined(invitee)).await;

        let referral = session.referral(UserId(50)).await.unwrap();
        assert_eq!(referral.inviter_id, UserId(1));
        assert!(!referral.role_bonus_applied);

        let after = session.current_holder().await.unwrap().deadline;
        assert_eq!((before - after).num_seconds(), 10);
        assert_eq!(session.bonus_stats(UserId(1)).await.invites_applied, 1);
    }

    #[tokio::test]
    async fn test_young_account_join_is_ignored() {
        let (session, client) = session().await;
        let alice = member(1, &[3]);
        client.add_member(alice.clone());

        client.set_invites(vec![InviteInfo {
            code: "abc".to_string(),
            uses: 0,
            inviter: Some(UserId(1)),
        }]);
        session.dispatch(ChatEvent::Connected).await;
        session.start_or_takeover(&alice, TARGET, None, None).await;

        client.set_invites(vec![InviteInfo {
            code: "abc".to_string(),
            uses: 1,
            inviter: Some(UserId(1)),
        }]);
        let mut invitee = member(50, &[]);
        invitee.created_at = Utc::now() - ChronoDuration::days(1);
        session.dispatch(ChatEvent::MemberJoined(invitee)).await;

        assert!(session.referral(UserId(50)).await.is_none());
        assert_eq!(session.bonus_stats(UserId(1)).await.invites_applied, 0);
    }

    #[tokio::test]
    async fn test_role_grant_applies_bonus_when_inviter_holds() {
        let (session, client) = session().await;
        let alice = member(1, &[3]);
        client.add_member(alice.clone());

        client.set_invites(vec![InviteInfo {
            code: "abc".to_string(),
            uses: 0,
            inviter: Some(UserId(1)),
        }]);
        session.dispatch(ChatEvent::Connected).await;
        session.start_or_takeover(&alice, TARGET, None, None).await;

        client.set_invites(vec![InviteInfo {
            code: "abc".to_string(),
            uses: 1,
            inviter: Some(UserId(1)),
        }]);
        session.dispatch(ChatEvent::MemberJoined(member(50, &[]))).await;

        // invitee later gains the eligibility role
        session
            .dispatch(ChatEvent::MemberRolesUpdated {
                member: member(50, &[3]),
                previous_roles: vec![],
            })
            .await;

        let referral = session.referral(UserId(50)).await.unwrap();
        assert!(referral.role_bonus_applied);
        let stats = session.bonus_stats(UserId(1)).await;
        assert_eq!(stats.role_bonuses_applied, 1);
        assert_eq!(stats.role_seconds_applied, 10);
    }

    #[tokio::test]
    async fn test_role_grant_stays_pending_when_inviter_not_holding() {
        let (session, client) = session().await;
        let alice = member(1, &[3]);
        client.add_member(alice.clone());

        client.set_invites(vec![InviteInfo {
            code: "abc".to_string(),
            uses: 0,
            inviter: Some(UserId(1)),
        }]);
        session.dispatch(ChatEvent::Connected).await;
        // no countdown running

        client.set_invites(vec![InviteInfo {
            code: "abc".to_string(),
            uses: 1,
            inviter: Some(UserId(1)),
        }]);
        session.dispatch(ChatEvent::MemberJoined(member(50, &[]))).await;

        session
            .dispatch(ChatEvent::MemberRolesUpdated {
                member: member(50, &[3]),
                previous_roles: vec![],
            })
            .await;

        // flag deliberately stays false: the bonus remains available for a
        // later occasion when the inviter is actually holding
        let referral = session.referral(UserId(50)).await.unwrap();
        assert!(!referral.role_bonus_applied);
        assert_eq!(session.bonus_stats(UserId(1)).await.role_bonuses_applied, 0);
    }

    #[tokio::test]
    async fn test_takeover_preserves_accumulated_counters() {
        let (session, _client) = session().await;
        let alice = member(1, &[3]);
        let bob = member(2, &[3]);

        session.start_or_takeover(&alice, TARGET, None, None).await;
        session.apply_invite_bonus(UserId(1), 2).await;

        session.start_or_takeover(&bob, TARGET, None, None).await;

        let stats = session.bonus_stats(UserId(1)).await;
        assert_eq!(stats.invites_applied, 2);
        assert_eq!(stats.invite_seconds_applied, 20);
        assert_eq!(session.current_holder().await.unwrap().user, UserId(2));
    }
}
