//! Chat Platform Integration Module
//!
//! The giveaway core talks to an abstract gateway only:
//! - `traits` defines the ChatGateway capability set and inbound ChatEvents
//! - `discord` binds the trait to Discord via serenity
//! - `mock` replaces the gateway in tests

pub mod discord;
pub mod mock;
pub mod traits;

pub use discord::{DiscordGateway, EventTranslator};
pub use mock::MockChatClient;
pub use traits::{
    ChannelId, ChannelMessage, ChatError, ChatEvent, ChatGateway, ChatResult, InviteInfo, Member,
    MessageBody, MessageId, RoleId, UserId,
};
