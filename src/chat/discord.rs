//! Discord Gateway Binding
//!
//! Binds the abstract ChatGateway to Discord via serenity:
//! - DiscordGateway implements the trait over the REST surface
//! - EventTranslator is the serenity EventHandler, forwarding gateway
//!   events to the session's dispatch loop as ChatEvents
//!
//! Role permissions and the guild owner are cached on connect so the
//! administrator bit can be resolved without per-message REST calls.

use super::traits::{
    ChannelId, ChannelMessage, ChatError, ChatEvent, ChatGateway, ChatResult, InviteInfo, Member,
    MessageBody, MessageId, RoleId, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::all::{
    Context, CreateEmbed, CreateMessage, EditMessage, EventHandler, GatewayIntents, Http,
    MessageReference, PermissionOverwrite, PermissionOverwriteType, Ready,
};
use serenity::model::event::{GuildMemberUpdateEvent, InviteCreateEvent, InviteDeleteEvent};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Gateway intents the bot needs: channel messages with content, member
/// joins/updates, and invite bookkeeping.
pub fn required_intents() -> GatewayIntents {
    GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_INVITES
}

/// ChatGateway implementation over Discord's REST API
#[derive(Clone)]
pub struct DiscordGateway {
    http: Arc<Http>,
    guild: serenity::all::GuildId,
    /// Role ids carrying the ADMINISTRATOR permission, refreshed on connect
    admin_roles: Arc<RwLock<HashSet<u64>>>,
    owner: Arc<RwLock<Option<u64>>>,
}

impl DiscordGateway {
    pub fn new(http: Arc<Http>, guild_id: u64) -> Self {
        Self {
            http,
            guild: serenity::all::GuildId::new(guild_id),
            admin_roles: Arc::new(RwLock::new(HashSet::new())),
            owner: Arc::new(RwLock::new(None)),
        }
    }

    pub fn guild_id(&self) -> serenity::all::GuildId {
        self.guild
    }

    /// Refresh the role-permission cache and guild owner. Called on every
    /// gateway (re)connect; admin resolution degrades to role-set-only if
    /// a refresh fails.
    pub async fn refresh_guild(&self) -> ChatResult<()> {
        let roles = self.guild.roles(&self.http).await.map_err(map_err)?;
        let admins: HashSet<u64> = roles
            .iter()
            .filter(|(_, role)| role.permissions.administrator())
            .map(|(id, _)| id.get())
            .collect();
        if let Ok(mut cache) = self.admin_roles.write() {
            *cache = admins;
        }

        let guild = self.guild.to_partial_guild(&self.http).await.map_err(map_err)?;
        if let Ok(mut owner) = self.owner.write() {
            *owner = Some(guild.owner_id.get());
        }
        Ok(())
    }

    fn is_platform_admin(&self, user: u64, roles: &[serenity::all::RoleId]) -> bool {
        let owned = self
            .owner
            .read()
            .ok()
            .and_then(|o| *o)
            .is_some_and(|owner| owner == user);
        if owned {
            return true;
        }
        self.admin_roles
            .read()
            .map(|cache| roles.iter().any(|r| cache.contains(&r.get())))
            .unwrap_or(false)
    }

    pub(crate) fn convert_member(&self, member: &serenity::all::Member) -> Member {
        Member {
            id: UserId(member.user.id.get()),
            roles: member.roles.iter().map(|r| RoleId(r.get())).collect(),
            created_at: from_timestamp(member.user.created_at()),
            administrator: self.is_platform_admin(member.user.id.get(), &member.roles),
        }
    }

    /// Resolve the author of a channel message. Uses the partial member
    /// attached to the gateway event when present, falling back to a member
    /// fetch; bot authors skip resolution entirely.
    async fn message_author(&self, msg: &serenity::all::Message) -> Option<Member> {
        if msg.author.bot {
            return Some(Member {
                id: UserId(msg.author.id.get()),
                roles: Vec::new(),
                created_at: from_timestamp(msg.author.created_at()),
                administrator: false,
            });
        }
        if let Some(partial) = &msg.member {
            return Some(Member {
                id: UserId(msg.author.id.get()),
                roles: partial.roles.iter().map(|r| RoleId(r.get())).collect(),
                created_at: from_timestamp(msg.author.created_at()),
                administrator: self.is_platform_admin(msg.author.id.get(), &partial.roles),
            });
        }
        self.fetch_member(UserId(msg.author.id.get())).await.ok()
    }
}

#[async_trait]
impl ChatGateway for DiscordGateway {
    async fn send_message(&self, channel: ChannelId, body: &MessageBody) -> ChatResult<MessageId> {
        let sent = serenity::all::ChannelId::new(channel.0)
            .send_message(&self.http, render_create(body))
            .await
            .map_err(map_err)?;
        Ok(MessageId(sent.id.get()))
    }

    async fn send_reply(
        &self,
        channel: ChannelId,
        reply_to: MessageId,
        body: &MessageBody,
    ) -> ChatResult<MessageId> {
        let reference = MessageReference::from((
            serenity::all::ChannelId::new(channel.0),
            serenity::all::MessageId::new(reply_to.0),
        ));
        let sent = serenity::all::ChannelId::new(channel.0)
            .send_message(&self.http, render_create(body).reference_message(reference))
            .await
            .map_err(map_err)?;
        Ok(MessageId(sent.id.get()))
    }

    async fn edit_message(
        &self,
        channel: ChannelId,
        message: MessageId,
        body: &MessageBody,
    ) -> ChatResult<()> {
        serenity::all::ChannelId::new(channel.0)
            .edit_message(
                &self.http,
                serenity::all::MessageId::new(message.0),
                render_edit(body),
            )
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn delete_message(&self, channel: ChannelId, message: MessageId) -> ChatResult<()> {
        serenity::all::ChannelId::new(channel.0)
            .delete_message(&self.http, serenity::all::MessageId::new(message.0))
            .await
            .map_err(map_err)
    }

    async fn fetch_message(&self, channel: ChannelId, message: MessageId) -> ChatResult<()> {
        serenity::all::ChannelId::new(channel.0)
            .message(&self.http, serenity::all::MessageId::new(message.0))
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn set_posting_allowed(&self, channel: ChannelId, allowed: bool) -> ChatResult<()> {
        use serenity::all::Permissions;

        // The @everyone role shares the guild's id.
        let overwrite = PermissionOverwrite {
            allow: if allowed {
                Permissions::SEND_MESSAGES
            } else {
                Permissions::empty()
            },
            deny: if allowed {
                Permissions::empty()
            } else {
                Permissions::SEND_MESSAGES
            },
            kind: PermissionOverwriteType::Role(serenity::all::RoleId::new(self.guild.get())),
        };
        serenity::all::ChannelId::new(channel.0)
            .create_permission(&self.http, overwrite)
            .await
            .map_err(map_err)
    }

    async fn fetch_member(&self, user: UserId) -> ChatResult<Member> {
        let member = self
            .guild
            .member(&self.http, serenity::all::UserId::new(user.0))
            .await
            .map_err(map_err)?;
        Ok(self.convert_member(&member))
    }

    async fn list_invites(&self) -> ChatResult<Vec<InviteInfo>> {
        let invites = self.guild.invites(&self.http).await.map_err(map_err)?;
        Ok(invites
            .into_iter()
            .map(|invite| InviteInfo {
                code: invite.code,
                uses: invite.uses,
                inviter: invite.inviter.map(|user| UserId(user.id.get())),
            })
            .collect())
    }

    async fn send_direct_message(&self, user: UserId, body: &MessageBody) -> ChatResult<()> {
        let dm = serenity::all::UserId::new(user.0)
            .create_dm_channel(&self.http)
            .await
            .map_err(map_err)?;
        dm.id
            .send_message(&self.http, render_create(body))
            .await
            .map_err(map_err)?;
        Ok(())
    }
}

/// Serenity EventHandler that forwards gateway events to the session loop
pub struct EventTranslator {
    gateway: DiscordGateway,
    events: mpsc::Sender<ChatEvent>,
}

impl EventTranslator {
    pub fn new(gateway: DiscordGateway, events: mpsc::Sender<ChatEvent>) -> Self {
        Self { gateway, events }
    }

    async fn forward(&self, event: ChatEvent) {
        if self.events.send(event).await.is_err() {
            warn!("session event loop is gone, dropping gateway event");
        }
    }
}

#[async_trait]
impl EventHandler for EventTranslator {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(user = %ready.user.name, "connected to discord gateway");
        if let Err(err) = self.gateway.refresh_guild().await {
            warn!(%err, "failed to refresh guild role cache");
        }
        self.forward(ChatEvent::Connected).await;
    }

    async fn message(&self, _ctx: Context, msg: serenity::all::Message) {
        if msg.guild_id != Some(self.gateway.guild_id()) {
            return;
        }
        let Some(author) = self.gateway.message_author(&msg).await else {
            return;
        };
        self.forward(ChatEvent::Channel(ChannelMessage {
            id: MessageId(msg.id.get()),
            channel: ChannelId(msg.channel_id.get()),
            author,
            author_is_bot: msg.author.bot,
            content: msg.content.clone(),
            reply_to: msg
                .message_reference
                .as_ref()
                .and_then(|r| r.message_id)
                .map(|id| MessageId(id.get())),
        }))
        .await;
    }

    async fn guild_member_addition(&self, _ctx: Context, new_member: serenity::all::Member) {
        if new_member.guild_id != self.gateway.guild_id() {
            return;
        }
        let member = self.gateway.convert_member(&new_member);
        self.forward(ChatEvent::MemberJoined(member)).await;
    }

    async fn guild_member_update(
        &self,
        _ctx: Context,
        old_if_available: Option<serenity::all::Member>,
        new: Option<serenity::all::Member>,
        event: GuildMemberUpdateEvent,
    ) {
        if event.guild_id != self.gateway.guild_id() {
            return;
        }
        // Without a cached before-image the role transition cannot be
        // observed, so the event is dropped.
        let Some(old) = old_if_available else {
            return;
        };
        let previous_roles: Vec<RoleId> = old.roles.iter().map(|r| RoleId(r.get())).collect();
        let member = match new {
            Some(m) => self.gateway.convert_member(&m),
            None => Member {
                id: UserId(event.user.id.get()),
                roles: event.roles.iter().map(|r| RoleId(r.get())).collect(),
                created_at: from_timestamp(event.user.created_at()),
                administrator: false,
            },
        };
        self.forward(ChatEvent::MemberRolesUpdated {
            member,
            previous_roles,
        })
        .await;
    }

    async fn invite_create(&self, _ctx: Context, event: InviteCreateEvent) {
        if event.guild_id != Some(self.gateway.guild_id()) {
            return;
        }
        self.forward(ChatEvent::InviteCreated {
            code: event.code,
            uses: 0,
        })
        .await;
    }

    async fn invite_delete(&self, _ctx: Context, event: InviteDeleteEvent) {
        if event.guild_id != Some(self.gateway.guild_id()) {
            return;
        }
        self.forward(ChatEvent::InviteDeleted { code: event.code })
            .await;
    }
}

fn render_create(body: &MessageBody) -> CreateMessage {
    let mut message = CreateMessage::new().embed(render_embed(body));
    if let Some(notice) = &body.notice {
        message = message.content(notice.clone());
    }
    message
}

fn render_edit(body: &MessageBody) -> EditMessage {
    let mut message = EditMessage::new().embed(render_embed(body));
    if let Some(notice) = &body.notice {
        message = message.content(notice.clone());
    }
    message
}

fn render_embed(body: &MessageBody) -> CreateEmbed {
    let mut embed = CreateEmbed::new().description(body.body.clone());
    if let Some(title) = &body.title {
        embed = embed.title(title.clone());
    }
    for (name, value) in &body.fields {
        embed = embed.field(name.clone(), value.clone(), true);
    }
    embed
}

fn from_timestamp(ts: serenity::model::Timestamp) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(ts.unix_timestamp(), 0).unwrap_or_else(Utc::now)
}

fn map_err(err: serenity::Error) -> ChatError {
    use serenity::http::HttpError;

    match &err {
        serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) => {
            match response.status_code.as_u16() {
                403 => ChatError::Forbidden,
                404 => ChatError::NotFound,
                429 => ChatError::RateLimited,
                _ => ChatError::Network(err.to_string()),
            }
        }
        _ => ChatError::Network(err.to_string()),
    }
}
