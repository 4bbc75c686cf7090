//! Mock Chat Client for Testing
//!
//! Provides MockChatClient for full test coverage without a real gateway.

use super::traits::*;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Mock chat client for testing
#[derive(Clone)]
pub struct MockChatClient {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    /// Live messages by id (send/edit/delete/fetch operate on this)
    messages: HashMap<MessageId, LiveMessage>,
    /// Everything ever sent, including later-deleted messages
    sent_log: Vec<SentMessage>,
    deleted: Vec<MessageId>,
    dms: Vec<(UserId, MessageBody)>,
    members: HashMap<UserId, Member>,
    invites: Vec<InviteInfo>,
    /// History of set_posting_allowed calls
    posting_changes: Vec<bool>,
    next_message_id: u64,
    fail_sends: bool,
}

#[derive(Debug, Clone)]
struct LiveMessage {
    channel: ChannelId,
    body: MessageBody,
}

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub id: MessageId,
    pub channel: ChannelId,
    pub reply_to: Option<MessageId>,
    pub body: MessageBody,
}

impl MockChatClient {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                next_message_id: 1000,
                ..MockState::default()
            })),
        }
    }

    /// Seed a pre-existing message (e.g. the pinned target message)
    pub fn seed_message(&self, channel: ChannelId, id: MessageId) {
        let mut state = self.state.lock().unwrap();
        state.messages.insert(
            id,
            LiveMessage {
                channel,
                body: MessageBody::default(),
            },
        );
    }

    /// Register a guild member for fetch_member
    pub fn add_member(&self, member: Member) {
        let mut state = self.state.lock().unwrap();
        state.members.insert(member.id, member);
    }

    pub fn remove_member(&self, user: UserId) {
        self.state.lock().unwrap().members.remove(&user);
    }

    /// Replace the guild invite listing
    pub fn set_invites(&self, invites: Vec<InviteInfo>) {
        self.state.lock().unwrap().invites = invites;
    }

    /// All sends, in order, including messages deleted afterwards
    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.state.lock().unwrap().sent_log.clone()
    }

    /// Current body of a live message, if it still exists
    pub fn message_body(&self, id: MessageId) -> Option<MessageBody> {
        self.state
            .lock()
            .unwrap()
            .messages
            .get(&id)
            .map(|m| m.body.clone())
    }

    pub fn message_exists(&self, id: MessageId) -> bool {
        self.state.lock().unwrap().messages.contains_key(&id)
    }

    pub fn deleted_messages(&self) -> Vec<MessageId> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn direct_messages(&self, user: UserId) -> Vec<MessageBody> {
        self.state
            .lock()
            .unwrap()
            .dms
            .iter()
            .filter(|(u, _)| *u == user)
            .map(|(_, b)| b.clone())
            .collect()
    }

    /// Most recent posting-permission change, if any was made
    pub fn posting_allowed(&self) -> Option<bool> {
        self.state.lock().unwrap().posting_changes.last().copied()
    }

    /// Make send_message / send_reply fail with Forbidden
    pub fn fail_sends(&self, fail: bool) {
        self.state.lock().unwrap().fail_sends = fail;
    }

    /// Clear all state
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        *state = MockState {
            next_message_id: 1000,
            ..MockState::default()
        };
    }

    fn record_send(
        state: &mut MockState,
        channel: ChannelId,
        reply_to: Option<MessageId>,
        body: &MessageBody,
    ) -> ChatResult<MessageId> {
        if state.fail_sends {
            return Err(ChatError::Forbidden);
        }
        let id = MessageId(state.next_message_id);
        state.next_message_id += 1;
        state.messages.insert(
            id,
            LiveMessage {
                channel,
                body: body.clone(),
            },
        );
        state.sent_log.push(SentMessage {
            id,
            channel,
            reply_to,
            body: body.clone(),
        });
        Ok(id)
    }
}

impl Default for MockChatClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatGateway for MockChatClient {
    async fn send_message(&self, channel: ChannelId, body: &MessageBody) -> ChatResult<MessageId> {
        let mut state = self.state.lock().unwrap();
        Self::record_send(&mut state, channel, None, body)
    }

    async fn send_reply(
        &self,
        channel: ChannelId,
        reply_to: MessageId,
        body: &MessageBody,
    ) -> ChatResult<MessageId> {
        let mut state = self.state.lock().unwrap();
        if !state.messages.contains_key(&reply_to) {
            return Err(ChatError::NotFound);
        }
        Self::record_send(&mut state, channel, Some(reply_to), body)
    }

    async fn edit_message(
        &self,
        _channel: ChannelId,
        message: MessageId,
        body: &MessageBody,
    ) -> ChatResult<()> {
        let mut state = self.state.lock().unwrap();
        match state.messages.get_mut(&message) {
            Some(live) => {
                live.body = body.clone();
                Ok(())
            }
            None => Err(ChatError::NotFound),
        }
    }

    async fn delete_message(&self, _channel: ChannelId, message: MessageId) -> ChatResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.messages.remove(&message).is_none() {
            return Err(ChatError::NotFound);
        }
        state.deleted.push(message);
        Ok(())
    }

    async fn fetch_message(&self, _channel: ChannelId, message: MessageId) -> ChatResult<()> {
        let state = self.state.lock().unwrap();
        if state.messages.contains_key(&message) {
            Ok(())
        } else {
            Err(ChatError::NotFound)
        }
    }

    async fn set_posting_allowed(&self, _channel: ChannelId, allowed: bool) -> ChatResult<()> {
        self.state.lock().unwrap().posting_changes.push(allowed);
        Ok(())
    }

    async fn fetch_member(&self, user: UserId) -> ChatResult<Member> {
        let state = self.state.lock().unwrap();
        state.members.get(&user).cloned().ok_or(ChatError::NotFound)
    }

    async fn list_invites(&self) -> ChatResult<Vec<InviteInfo>> {
        Ok(self.state.lock().unwrap().invites.clone())
    }

    async fn send_direct_message(&self, user: UserId, body: &MessageBody) -> ChatResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.members.contains_key(&user) {
            return Err(ChatError::NotFound);
        }
        state.dms.push((user, body.clone()));
        Ok(())
    }
}
