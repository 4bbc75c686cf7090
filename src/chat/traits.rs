//! Chat Gateway Trait Abstractions
//!
//! These traits enable full test coverage via MockChatClient: the giveaway
//! core only ever talks to the abstract gateway, never to serenity directly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;

/// Platform user identifier (snowflake)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct UserId(pub u64);

/// Platform channel identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ChannelId(pub u64);

/// Platform message identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct MessageId(pub u64);

/// Platform role identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct RoleId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resolved guild member: roles, account age, and administrator bit
///
/// `administrator` reflects the platform's own administrator permission.
/// Configured admin *roles* are checked separately by the policy layer.
#[derive(Debug, Clone)]
pub struct Member {
    pub id: UserId,
    pub roles: Vec<RoleId>,
    pub created_at: DateTime<Utc>,
    pub administrator: bool,
}

/// A message observed in a guild channel
#[derive(Debug, Clone)]
pub struct ChannelMessage {
    pub id: MessageId,
    pub channel: ChannelId,
    pub author: Member,
    pub author_is_bot: bool,
    pub content: String,
    /// Message id this message replies to, if it is a reply
    pub reply_to: Option<MessageId>,
}

/// Guild invite snapshot entry
#[derive(Debug, Clone)]
pub struct InviteInfo {
    pub code: String,
    pub uses: u64,
    pub inviter: Option<UserId>,
}

/// Renderable message content: an embed-shaped body plus an optional
/// plain-text notice shown outside the embed (e.g. an `@here` ping).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageBody {
    pub title: Option<String>,
    pub body: String,
    pub fields: Vec<(String, String)>,
    pub notice: Option<String>,
}

impl MessageBody {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }
}

/// Inbound platform events, delivered to the session's dispatch loop
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// Gateway (re)connected; invite snapshot and persisted state should be
    /// refreshed, and the stored countdown resumed on the first occurrence.
    Connected,
    Channel(ChannelMessage),
    MemberJoined(Member),
    /// A member's role set changed. `previous_roles` comes from the gateway
    /// cache; events without a usable before-image are not delivered.
    MemberRolesUpdated {
        member: Member,
        previous_roles: Vec<RoleId>,
    },
    InviteCreated { code: String, uses: u64 },
    InviteDeleted { code: String },
}

/// Result type for gateway operations
pub type ChatResult<T> = Result<T, ChatError>;

/// Gateway errors
///
/// `NotFound`, `Forbidden` and `RateLimited` are the transient outcomes the
/// core deliberately tolerates on cosmetic operations; state transitions
/// proceed regardless.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("not found")]
    NotFound,

    #[error("forbidden")]
    Forbidden,

    #[error("rate limited")]
    RateLimited,

    #[error("network error: {0}")]
    Network(String),
}

impl ChatError {
    /// True for outcomes that never abort a state transition
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ChatError::NotFound | ChatError::Forbidden | ChatError::RateLimited
        )
    }
}

/// Chat gateway abstraction for testing
///
/// The giveaway core calls this trait only. `DiscordGateway` binds it to the
/// real platform; `MockChatClient` replaces it in tests.
#[async_trait]
pub trait ChatGateway: Clone + Send + Sync + 'static {
    /// Post a message to a channel, returning its id
    async fn send_message(&self, channel: ChannelId, body: &MessageBody) -> ChatResult<MessageId>;

    /// Post a message as a reply to an existing message
    async fn send_reply(
        &self,
        channel: ChannelId,
        reply_to: MessageId,
        body: &MessageBody,
    ) -> ChatResult<MessageId>;

    /// Edit a previously sent message in place
    async fn edit_message(
        &self,
        channel: ChannelId,
        message: MessageId,
        body: &MessageBody,
    ) -> ChatResult<()>;

    /// Delete a message
    async fn delete_message(&self, channel: ChannelId, message: MessageId) -> ChatResult<()>;

    /// Existence probe: succeeds iff the message is still fetchable
    async fn fetch_message(&self, channel: ChannelId, message: MessageId) -> ChatResult<()>;

    /// Edit the channel's permission overwrites so that everyone can / cannot post
    async fn set_posting_allowed(&self, channel: ChannelId, allowed: bool) -> ChatResult<()>;

    /// Resolve a guild member (roles, account age, administrator bit)
    async fn fetch_member(&self, user: UserId) -> ChatResult<Member>;

    /// Enumerate the guild's invites with current use counts
    async fn list_invites(&self) -> ChatResult<Vec<InviteInfo>>;

    /// Deliver a direct message (best effort; recipients may block DMs)
    async fn send_direct_message(&self, user: UserId, body: &MessageBody) -> ChatResult<()>;
}
