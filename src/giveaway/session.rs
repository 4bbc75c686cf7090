//! Countdown/Holder State Machine
//!
//! GiveawaySession owns the single mutable piece of giveaway state:
//! who holds the active slot, until when, and the timer driving the live
//! countdown. All mutation happens behind one async mutex so event
//! dispatch, timer ticks and bonus application serialize.
//!
//! Timer generations are tracked with an epoch counter incremented on
//! every takeover/clear. A takeover aborts the previous timer task
//! eagerly; the epoch check inside the tick is the backstop for the
//! window between abort request and task exit.

use super::messages::{self, NoticeText};
use super::state::{BonusLedger, HolderRecord, LockFlag, NotifiedUsers, ReferralTable, ReferralRecord, UserBonusStats};
use crate::chat::{
    ChannelId, ChatEvent, ChatGateway, ChatResult, Member, MessageId, RoleId, UserId,
};
use crate::store::{keys, StateStore};
use chrono::{DateTime, NaiveTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Giveaway configuration, resolved and validated at startup
#[derive(Debug, Clone)]
pub struct GiveawayConfig {
    pub channel: ChannelId,
    pub target_message: MessageId,
    pub admin_roles: HashSet<RoleId>,
    pub quiet_roles: HashSet<RoleId>,
    /// Empty set means everyone is eligible
    pub eligible_roles: HashSet<RoleId>,
    pub countdown_seconds: i64,
    pub tick_rate: Duration,
    pub alert_at_seconds: i64,
    pub invite_bonus_seconds: i64,
    pub role_bonus_seconds: i64,
    pub min_account_age_days: i64,
    pub quiet_start: NaiveTime,
    pub quiet_end: NaiveTime,
    pub notices: NoticeText,
}

impl GiveawayConfig {
    /// Platform administrator permission OR membership in a configured
    /// admin role
    pub fn is_admin(&self, member: &Member) -> bool {
        member.administrator || member.roles.iter().any(|r| self.admin_roles.contains(r))
    }

    pub fn has_quiet_role(&self, roles: &[RoleId]) -> bool {
        roles.iter().any(|r| self.quiet_roles.contains(r))
    }

    pub fn is_eligible(&self, roles: &[RoleId]) -> bool {
        if self.eligible_roles.is_empty() {
            return true;
        }
        roles.iter().any(|r| self.eligible_roles.contains(r))
    }
}

pub(crate) struct SessionState {
    pub(crate) holder: Option<HolderRecord>,
    /// Timer generation; a tick whose epoch no longer matches stops silently
    pub(crate) epoch: u64,
    pub(crate) timer: Option<JoinHandle<()>>,
    pub(crate) locked: bool,
    /// Persisted state loaded and countdown resumed on first connect only
    pub(crate) restored: bool,
    pub(crate) notified: HashSet<UserId>,
    pub(crate) referrals: HashMap<UserId, ReferralRecord>,
    pub(crate) stats: HashMap<UserId, UserBonusStats>,
    pub(crate) invite_uses: HashMap<String, u64>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            holder: None,
            epoch: 0,
            timer: None,
            locked: false,
            restored: false,
            notified: HashSet::new(),
            referrals: HashMap::new(),
            stats: HashMap::new(),
            invite_uses: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickFlow {
    Continue,
    Stop,
}

/// The giveaway coordinator session
#[derive(Clone)]
pub struct GiveawaySession<C: ChatGateway> {
    pub(crate) client: C,
    pub(crate) store: StateStore,
    pub(crate) config: Arc<GiveawayConfig>,
    pub(crate) inner: Arc<Mutex<SessionState>>,
}

impl<C: ChatGateway> GiveawaySession<C> {
    pub fn new(client: C, store: StateStore, config: GiveawayConfig) -> Self {
        Self {
            client,
            store,
            config: Arc::new(config),
            inner: Arc::new(Mutex::new(SessionState::default())),
        }
    }

    /// Drive the session from the platform event stream. Returns when the
    /// sender side is dropped.
    pub async fn run(&self, mut events: mpsc::Receiver<ChatEvent>) {
        while let Some(event) = events.recv().await {
            self.dispatch(event).await;
        }
        info!("event stream closed, session loop exiting");
    }

    pub async fn dispatch(&self, event: ChatEvent) {
        match event {
            ChatEvent::Connected => self.on_connected().await,
            ChatEvent::Channel(message) => {
                if message.channel == self.config.channel {
                    self.handle_channel_message(&message).await;
                }
            }
            ChatEvent::MemberJoined(member) => self.handle_member_join(member).await,
            ChatEvent::MemberRolesUpdated {
                member,
                previous_roles,
            } => self.handle_role_update(&member, &previous_roles).await,
            ChatEvent::InviteCreated { code, uses } => {
                self.inner.lock().await.invite_uses.insert(code, uses);
            }
            ChatEvent::InviteDeleted { code } => {
                self.inner.lock().await.invite_uses.remove(&code);
            }
        }
    }

    /// Gateway (re)connect: refresh the invite snapshot every time, load
    /// persisted state and resume the stored countdown on the first one.
    async fn on_connected(&self) {
        let invites = match self.client.list_invites().await {
            Ok(list) => list.into_iter().map(|i| (i.code, i.uses)).collect(),
            Err(err) => {
                debug!(%err, "invite listing unavailable");
                HashMap::new()
            }
        };

        {
            let mut st = self.inner.lock().await;
            st.invite_uses = invites;
            if st.restored {
                return;
            }
            st.restored = true;
            st.locked = self
                .store
                .get::<LockFlag>(keys::CHANNEL_LOCKED)
                .await
                .map(|f| f.locked)
                .unwrap_or(false);
            st.notified = self
                .store
                .get::<NotifiedUsers>(keys::NOTIFIED_USERS)
                .await
                .unwrap_or_default()
                .into_set();
            st.referrals = self
                .store
                .get::<ReferralTable>(keys::REFERRALS)
                .await
                .unwrap_or_default()
                .into_map();
            st.stats = self
                .store
                .get::<BonusLedger>(keys::USER_STATS)
                .await
                .unwrap_or_default()
                .into_map();
        }
        self.resume_from_storage().await;
    }

    /// Start a countdown for `participant`, evicting any previous holder.
    ///
    /// `resume_deadline` reuses a stored deadline when it is still in the
    /// future; `existing_status` reuses a still-live status message
    /// instead of posting a new one (resume path). After this returns,
    /// exactly one holder exists and exactly one timer loop is bound to it.
    pub async fn start_or_takeover(
        &self,
        participant: &Member,
        reply_to: MessageId,
        resume_deadline: Option<DateTime<Utc>>,
        existing_status: Option<MessageId>,
    ) {
        let mut st = self.inner.lock().await;

        // Eager cancellation of the previous timer; the epoch bump below
        // is the backstop if the task is already mid-tick.
        if let Some(timer) = st.timer.take() {
            timer.abort();
        }
        if let Some(previous) = st.holder.take() {
            if let Some(status) = previous.status_message {
                if existing_status != Some(status) {
                    best_effort(
                        "previous status delete",
                        self.client.delete_message(self.config.channel, status).await,
                    );
                }
            }
        }

        let now = Utc::now();
        let deadline = match resume_deadline {
            Some(stored) if stored > now => stored,
            _ => now + chrono::Duration::seconds(self.config.countdown_seconds),
        };
        let remaining = (deadline - now).num_seconds();
        let stats = st.stats.get(&participant.id).copied().unwrap_or_default();
        let body = messages::countdown(participant.id, remaining, &stats);

        let status_message = match existing_status {
            Some(id) => {
                best_effort(
                    "status reuse edit",
                    self.client.edit_message(self.config.channel, id, &body).await,
                );
                Some(id)
            }
            None => match self
                .client
                .send_reply(self.config.channel, reply_to, &body)
                .await
            {
                Ok(id) => Some(id),
                Err(err) => {
                    warn!(%err, "could not post countdown status message");
                    None
                }
            },
        };

        st.holder = Some(HolderRecord {
            user: participant.id,
            deadline,
            source_message: reply_to,
            status_message,
        });
        st.epoch += 1;
        self.persist_holder(st.holder.as_ref()).await;
        st.timer = Some(self.spawn_timer(st.epoch));
        info!(user = %participant.id, remaining, "countdown started");
    }

    fn spawn_timer(&self, epoch: u64) -> JoinHandle<()> {
        let session = self.clone();
        let tick_rate = self.config.tick_rate;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(tick_rate).await;
                if session.tick(epoch).await == TickFlow::Stop {
                    return;
                }
            }
        })
    }

    /// One logical countdown tick. Stops silently when the channel locked
    /// or a newer takeover superseded this loop's epoch; declares the
    /// winner when the deadline passed.
    pub(crate) async fn tick(&self, epoch: u64) -> TickFlow {
        let mut st = self.inner.lock().await;
        if st.locked || st.epoch != epoch {
            return TickFlow::Stop;
        }
        let Some(holder) = st.holder.clone() else {
            return TickFlow::Stop;
        };

        let now = Utc::now();
        let remaining = (holder.deadline - now).num_seconds();

        // Exact-equality alert: hit exactly once under per-tick cadence.
        // A delayed tick can skip past it; known and accepted.
        if remaining == self.config.alert_at_seconds {
            best_effort(
                "countdown alert",
                self.client
                    .send_message(self.config.channel, &messages::alert(remaining))
                    .await,
            );
        }

        if remaining <= 0 {
            self.declare_winner(&mut st).await;
            return TickFlow::Stop;
        }

        if let Some(status) = holder.status_message {
            let stats = st.stats.get(&holder.user).copied().unwrap_or_default();
            best_effort(
                "status update",
                self.client
                    .edit_message(
                        self.config.channel,
                        status,
                        &messages::countdown(holder.user, remaining, &stats),
                    )
                    .await,
            );
        }
        TickFlow::Continue
    }

    /// Announce the current holder as winner, lock the channel permanently
    /// and clear the countdown. Terminal for this run.
    pub(crate) async fn declare_winner(&self, st: &mut SessionState) {
        let Some(holder) = st.holder.clone() else {
            return;
        };
        info!(user = %holder.user, "declaring winner and locking channel");
        best_effort(
            "winner announcement",
            self.client
                .send_message(self.config.channel, &messages::winner(holder.user))
                .await,
        );
        best_effort(
            "channel lock",
            self.client
                .set_posting_allowed(self.config.channel, false)
                .await,
        );
        st.locked = true;
        if let Err(err) = self
            .store
            .put(keys::CHANNEL_LOCKED, &LockFlag { locked: true })
            .await
        {
            warn!(%err, "failed to persist channel lock");
        }
        // The winning tick clears its own loop; aborting it here is
        // unnecessary since it returns Stop right after.
        self.clear_inner(st, true).await;
    }

    /// Drop the active countdown: delete the status message best-effort,
    /// cancel the timer (unless the timer itself is clearing), wipe the
    /// persisted record.
    pub async fn clear(&self, skip_timer_cancel: bool) {
        let mut st = self.inner.lock().await;
        self.clear_inner(&mut st, skip_timer_cancel).await;
    }

    pub(crate) async fn clear_inner(&self, st: &mut SessionState, skip_timer_cancel: bool) {
        if let Some(holder) = st.holder.take() {
            if let Some(status) = holder.status_message {
                best_effort(
                    "status delete",
                    self.client.delete_message(self.config.channel, status).await,
                );
            }
        }
        match st.timer.take() {
            Some(timer) if !skip_timer_cancel => timer.abort(),
            _ => {}
        }
        st.epoch += 1;
        if let Err(err) = self.store.delete(keys::ACTIVE_HOLDER).await {
            warn!(%err, "failed to clear persisted holder");
        }
    }

    /// Rebuild the countdown from the persisted record after a restart.
    ///
    /// A stored deadline already in the past declares the stored holder
    /// winner immediately. An unresolvable target message or holder
    /// membership discards the record; no retries.
    pub async fn resume_from_storage(&self) {
        if self.inner.lock().await.locked {
            self.discard_persisted_holder().await;
            return;
        }
        let Some(stored) = self.store.get::<HolderRecord>(keys::ACTIVE_HOLDER).await else {
            return;
        };

        if self
            .client
            .fetch_message(self.config.channel, self.config.target_message)
            .await
            .is_err()
        {
            info!("target message unavailable, discarding stored countdown");
            self.discard_persisted_holder().await;
            return;
        }
        let participant = match self.client.fetch_member(stored.user).await {
            Ok(member) => member,
            Err(err) => {
                info!(user = %stored.user, %err, "stored holder unresolvable, discarding");
                self.discard_persisted_holder().await;
                return;
            }
        };

        if stored.deadline <= Utc::now() {
            // The restart outlived the countdown.
            let mut st = self.inner.lock().await;
            st.holder = Some(stored);
            self.declare_winner(&mut st).await;
            return;
        }

        let existing_status = match stored.status_message {
            Some(id) => self
                .client
                .fetch_message(self.config.channel, id)
                .await
                .ok()
                .map(|_| id),
            None => None,
        };
        info!(user = %stored.user, "resuming stored countdown");
        self.start_or_takeover(
            &participant,
            stored.source_message,
            Some(stored.deadline),
            existing_status,
        )
        .await;
    }

    /// Admin unlock: restore posting and clear the lock flag. Does not
    /// restore a holder or countdown.
    pub async fn unlock(&self) {
        let mut st = self.inner.lock().await;
        best_effort(
            "posting unlock",
            self.client
                .set_posting_allowed(self.config.channel, true)
                .await,
        );
        st.locked = false;
        if let Err(err) = self
            .store
            .put(keys::CHANNEL_LOCKED, &LockFlag { locked: false })
            .await
        {
            warn!(%err, "failed to persist unlock");
        }
        info!("channel unlocked by admin");
    }

    async fn discard_persisted_holder(&self) {
        if let Err(err) = self.store.delete(keys::ACTIVE_HOLDER).await {
            warn!(%err, "failed to discard persisted holder");
        }
    }

    pub(crate) async fn persist_holder(&self, holder: Option<&HolderRecord>) {
        let result = match holder {
            Some(record) => self.store.put(keys::ACTIVE_HOLDER, record).await,
            None => self.store.delete(keys::ACTIVE_HOLDER).await,
        };
        if let Err(err) = result {
            warn!(%err, "failed to persist holder state");
        }
    }

    pub(crate) async fn persist_notified(&self, st: &SessionState) {
        let table = NotifiedUsers::from_set(&st.notified);
        if let Err(err) = self.store.put(keys::NOTIFIED_USERS, &table).await {
            warn!(%err, "failed to persist notified users");
        }
    }

    pub(crate) async fn persist_referrals(&self, st: &SessionState) {
        let table = ReferralTable::from_map(&st.referrals);
        if let Err(err) = self.store.put(keys::REFERRALS, &table).await {
            warn!(%err, "failed to persist referrals");
        }
    }

    pub(crate) async fn persist_stats(&self, st: &SessionState) {
        let ledger = BonusLedger::from_map(&st.stats);
        if let Err(err) = self.store.put(keys::USER_STATS, &ledger).await {
            warn!(%err, "failed to persist bonus stats");
        }
    }

    // Inspection accessors, used by integration tests and the status CLI.

    pub async fn current_holder(&self) -> Option<HolderRecord> {
        self.inner.lock().await.holder.clone()
    }

    pub async fn is_locked(&self) -> bool {
        self.inner.lock().await.locked
    }

    pub async fn bonus_stats(&self, user: UserId) -> UserBonusStats {
        self.inner
            .lock()
            .await
            .stats
            .get(&user)
            .copied()
            .unwrap_or_default()
    }

    pub async fn referral(&self, invitee: UserId) -> Option<ReferralRecord> {
        self.inner.lock().await.referrals.get(&invitee).cloned()
    }
}

/// Log-and-continue wrapper for cosmetic gateway effects. Transient
/// outcomes (not found, forbidden, rate limited) are expected; anything
/// else is worth a warning, but never aborts the state transition.
pub(crate) fn best_effort<T>(op: &str, result: ChatResult<T>) {
    if let Err(err) = result {
        if err.is_transient() {
            debug!(op, %err, "suppressed transient gateway error");
        } else {
            warn!(op, %err, "gateway call failed");
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::chat::MockChatClient;
    use chrono::Duration as ChronoDuration;

    pub(crate) const CHANNEL: ChannelId = ChannelId(100);
    pub(crate) const TARGET: MessageId = MessageId(500);

    pub(crate) fn test_config() -> GiveawayConfig {
        GiveawayConfig {
            channel: CHANNEL,
            target_message: TARGET,
            admin_roles: [RoleId(1)].into_iter().collect(),
            quiet_roles: [RoleId(2)].into_iter().collect(),
            eligible_roles: [RoleId(3)].into_iter().collect(),
            countdown_seconds: 60,
            tick_rate: Duration::from_secs(30),
            alert_at_seconds: 10,
            invite_bonus_seconds: 10,
            role_bonus_seconds: 10,
            min_account_age_days: 3,
            quiet_start: NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
            quiet_end: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
            notices: NoticeText::default(),
        }
    }

    pub(crate) fn member(id: u64, roles: &[u64]) -> Member {
        Member {
            id: UserId(id),
            roles: roles.iter().map(|r| RoleId(*r)).collect(),
            created_at: Utc::now() - ChronoDuration::days(30),
            administrator: false,
        }
    }

    pub(crate) async fn session_with(
        config: GiveawayConfig,
    ) -> (GiveawaySession<MockChatClient>, MockChatClient) {
        let client = MockChatClient::new();
        client.seed_message(CHANNEL, TARGET);
        let store = StateStore::in_memory().await.unwrap();
        let session = GiveawaySession::new(client.clone(), store, config);
        (session, client)
    }

    pub(crate) async fn session() -> (GiveawaySession<MockChatClient>, MockChatClient) {
        session_with(test_config()).await
    }
}
