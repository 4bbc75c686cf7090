//! Restart/resume behavior: a persisted countdown must be reconstructed
//! (or immediately settled) by a fresh session over the same store,
//! without losing or duplicating the countdown.

use chrono::{Duration as ChronoDuration, Utc};
use holdout::chat::{
    ChannelId, ChannelMessage, ChatEvent, Member, MessageId, MockChatClient, RoleId, UserId,
};
use holdout::giveaway::state::{HolderRecord, LockFlag};
use holdout::giveaway::{GiveawayConfig, GiveawaySession, NoticeText};
use holdout::store::{keys, StateStore};
use std::time::Duration;

const CHANNEL: ChannelId = ChannelId(100);
const TARGET: MessageId = MessageId(500);

fn config() -> GiveawayConfig {
    GiveawayConfig {
        channel: CHANNEL,
        target_message: TARGET,
        admin_roles: [RoleId(1)].into_iter().collect(),
        quiet_roles: std::collections::HashSet::new(),
        eligible_roles: [RoleId(3)].into_iter().collect(),
        countdown_seconds: 60,
        tick_rate: Duration::from_millis(100),
        alert_at_seconds: 10,
        invite_bonus_seconds: 10,
        role_bonus_seconds: 10,
        min_account_age_days: 3,
        quiet_start: chrono::NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
        quiet_end: chrono::NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
        notices: NoticeText::default(),
    }
}

fn member(id: u64, roles: &[u64]) -> Member {
    Member {
        id: UserId(id),
        roles: roles.iter().map(|r| RoleId(*r)).collect(),
        created_at: Utc::now() - ChronoDuration::days(30),
        administrator: false,
    }
}

fn reply(id: u64, author: Member) -> ChatEvent {
    ChatEvent::Channel(ChannelMessage {
        id: MessageId(id),
        channel: CHANNEL,
        author,
        author_is_bot: false,
        content: "take it".to_string(),
        reply_to: Some(TARGET),
    })
}

#[tokio::test]
async fn resume_reconstructs_running_countdown_verbatim() {
    let client = MockChatClient::new();
    client.seed_message(CHANNEL, TARGET);
    client.add_member(member(1, &[3]));
    let store = StateStore::in_memory().await.unwrap();

    // first process: a holder takes over, then the process "dies"
    let first = GiveawaySession::new(client.clone(), store.clone(), config());
    first.dispatch(ChatEvent::Connected).await;
    client.seed_message(CHANNEL, MessageId(700));
    first.dispatch(reply(700, member(1, &[3]))).await;
    let persisted = first.current_holder().await.unwrap();
    drop(first);

    // second process over the same store and channel
    let second = GiveawaySession::new(client.clone(), store, config());
    second.dispatch(ChatEvent::Connected).await;

    let resumed = second.current_holder().await.unwrap();
    assert_eq!(resumed.user, persisted.user);
    // stored deadline is used verbatim, not restarted
    assert_eq!(resumed.deadline, persisted.deadline);
    // the still-live status message is reused instead of reposted
    assert_eq!(resumed.status_message, persisted.status_message);
}

#[tokio::test]
async fn resume_with_expired_deadline_settles_immediately() {
    let client = MockChatClient::new();
    client.seed_message(CHANNEL, TARGET);
    client.add_member(member(1, &[3]));
    let store = StateStore::in_memory().await.unwrap();

    store
        .put(
            keys::ACTIVE_HOLDER,
            &HolderRecord {
                user: UserId(1),
                deadline: Utc::now() - ChronoDuration::seconds(30),
                source_message: TARGET,
                status_message: None,
            },
        )
        .await
        .unwrap();

    let session = GiveawaySession::new(client.clone(), store.clone(), config());
    session.dispatch(ChatEvent::Connected).await;

    // no tick interval elapsed: settlement is immediate
    assert!(session.is_locked().await);
    assert!(session.current_holder().await.is_none());
    assert_eq!(client.posting_allowed(), Some(false));
    let winner_announced = client
        .sent_messages()
        .iter()
        .any(|m| m.body.title.as_deref() == Some("Winner Announced"));
    assert!(winner_announced);

    // the lock itself is persisted
    let flag: LockFlag = store.get(keys::CHANNEL_LOCKED).await.unwrap();
    assert!(flag.locked);
    // and the settled holder record is gone
    assert!(store.get::<HolderRecord>(keys::ACTIVE_HOLDER).await.is_none());
}

#[tokio::test]
async fn resume_timer_fires_winner_for_near_deadline() {
    let client = MockChatClient::new();
    client.seed_message(CHANNEL, TARGET);
    client.add_member(member(1, &[3]));
    let store = StateStore::in_memory().await.unwrap();

    store
        .put(
            keys::ACTIVE_HOLDER,
            &HolderRecord {
                user: UserId(1),
                deadline: Utc::now() + ChronoDuration::seconds(2),
                source_message: TARGET,
                status_message: None,
            },
        )
        .await
        .unwrap();

    let session = GiveawaySession::new(client.clone(), store, config());
    session.dispatch(ChatEvent::Connected).await;
    assert!(session.current_holder().await.is_some());
    assert!(!session.is_locked().await);

    tokio::time::sleep(Duration::from_millis(3000)).await;
    assert!(session.is_locked().await);
    assert!(session.current_holder().await.is_none());
}

#[tokio::test]
async fn locked_channel_discards_stale_stored_state()  {
    let client = MockChatClient::new();
    client.seed_message(CHANNEL, TARGET);
    client.add_member(member(1, &[3]));
    let store = StateStore::in_memory().await.unwrap();

    store.put(keys::CHANNEL_LOCKED, &LockFlag { locked: true }).await.unwrap();
    store
        .put(
            keys::ACTIVE_HOLDER,
            &HolderRecord {
                user: UserId(1),
                deadline: Utc::now() + ChronoDuration::seconds(60),
                source_message: TARGET,
                status_message: None,
            },
        )
        .await
        .unwrap();

    let session = GiveawaySession::new(client.clone(), store.clone(), config());
    session.dispatch(ChatEvent::Connected).await;

    assert!(session.is_locked().await);
    assert!(session.current_holder().await.is_none());
    assert!(store.get::<HolderRecord>(keys::ACTIVE_HOLDER).await.is_none());
}

#[tokio::test]
async fn missing_target_message_discards_stored_state() {
    let client = MockChatClient::new();
    // target message NOT seeded
    client.add_member(member(1, &[3]));
    let store = StateStore::in_memory().await.unwrap();

    store
        .put(
            keys::ACTIVE_HOLDER,
            &HolderRecord {
                user: UserId(1),
                deadline: Utc::now() + ChronoDuration::seconds(60),
                source_message: TARGET,
                status_message: None,
            },
        )
        .await
        .unwrap();

    let session = GiveawaySession::new(client.clone(), store.clone(), config());
    session.dispatch(ChatEvent::Connected).await;

    assert!(session.current_holder().await.is_none());
    assert!(!session.is_locked().await);
    assert!(store.get::<HolderRecord>(keys::ACTIVE_HOLDER).await.is_none());
}

#[tokio::test]
async fn departed_holder_discards_stored_state() {
    let client = MockChatClient::new();
    client.seed_message(CHANNEL, TARGET);
    // holder is no longer a guild member
    let store = StateStore::in_memory().await.unwrap();

    store
        .put(
            keys::ACTIVE_HOLDER,
            &HolderRecord {
                user: UserId(1),
                deadline: Utc::now() + ChronoDuration::seconds(60),
                source_message: TARGET,
                status_message: None,
            },
        )
        .await
        .unwrap();

    let session = GiveawaySession::new(client.clone(), store.clone(), config());
    session.dispatch(ChatEvent::Connected).await;

    assert!(session.current_holder().await.is_none());
    assert!(store.get::<HolderRecord>(keys::ACTIVE_HOLDER).await.is_none());
}

#[tokio::test]
async fn vanished_status_message_gets_reposted_on_resume() {
    let client = MockChatClient::new();
    client.seed_message(CHANNEL, TARGET);
    client.add_member(member(1, &[3]));
    let store = StateStore::in_memory().await.unwrap();

    // stored status message does not exist anymore
    store
        .put(
            keys::ACTIVE_HOLDER,
            &HolderRecord {
                user: UserId(1),
                deadline: Utc::now() + ChronoDuration::seconds(60),
                source_message: TARGET,
                status_message: Some(MessageId(9999)),
            },
        )
        .await
        .unwrap();

    let session = GiveawaySession::new(client.clone(), store, config());
    session.dispatch(ChatEvent::Connected).await;

    let holder = session.current_holder().await.unwrap();
    let status = holder.status_message.unwrap();
    assert_ne!(status, MessageId(9999));
    assert!(client.message_exists(status));
}

#[tokio::test]
async fn bonus_counters_survive_restart() {
    let client = MockChatClient::new();
    client.seed_message(CHANNEL, TARGET);
    client.add_member(member(1, &[3]));
    let store = StateStore::in_memory().await.unwrap();

    let first = GiveawaySession::new(client.clone(), store.clone(), config());
    first.dispatch(ChatEvent::Connected).await;
    client.seed_message(CHANNEL, MessageId(700));
    first.dispatch(reply(700, member(1, &[3]))).await;
    first.apply_invite_bonus(UserId(1), 2).await;
    drop(first);

    let second = GiveawaySession::new(client.clone(), store, config());
    second.dispatch(ChatEvent::Connected).await;

    let stats = second.bonus_stats(UserId(1)).await;
    assert_eq!(stats.invites_applied, 2);
    assert_eq!(stats.invite_seconds_applied, 20);
}
