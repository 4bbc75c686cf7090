//! Event Policy Layer
//!
//! Classifies an inbound message in the target channel and invokes the
//! state machine. Branch order (first match wins):
//!   1. bot author -> ignore
//!   2. admin `!unlock` command
//!   3. channel locked -> delete (admins exempt)
//!   4. missing eligibility role -> registration DM once, delete
//!   5. quiet hours + quiet role -> delete, DM
//!   6. not a reply to the target message -> delete, transient hint
//!   7. holder speaking during own countdown -> delete
//!   8. valid takeover
//!
//! Admins are never deleted regardless of branch.

use super::clock;
use super::messages;
use super::session::{best_effort, GiveawaySession};
use crate::chat::{ChannelMessage, ChatGateway, MessageBody, MessageId};
use chrono::Utc;
use std::time::Duration;
use tracing::debug;

/// How long the "reply to the target message" hint stays up
const NON_REPLY_HINT_TTL: Duration = Duration::from_secs(5);
/// How long the takeover confirmation stays up
const TAKEOVER_NOTE_TTL: Duration = Duration::from_secs(2);

const UNLOCK_COMMAND: &str = "!unlock";

impl<C: ChatGateway> GiveawaySession<C> {
    pub(crate) async fn handle_channel_message(&self, msg: &ChannelMessage) {
        if msg.author_is_bot {
            return;
        }

        let admin = self.config.is_admin(&msg.author);

        if admin && msg.content.trim().eq_ignore_ascii_case(UNLOCK_COMMAND) {
            self.unlock().await;
            return;
        }

        if self.is_locked().await {
            if !admin {
                self.delete_channel_message(msg.id).await;
            }
            return;
        }

        if !admin && !self.config.is_eligible(&msg.author.roles) {
            self.notify_registration_required(msg).await;
            self.delete_channel_message(msg.id).await;
            return;
        }

        if !admin
            && clock::in_quiet_window(
                clock::now_time(),
                self.config.quiet_start,
                self.config.quiet_end,
            )
            && self.config.has_quiet_role(&msg.author.roles)
        {
            self.delete_channel_message(msg.id).await;
            best_effort(
                "quiet hours notice",
                self.client
                    .send_direct_message(msg.author.id, &messages::quiet_hours(&self.config.notices))
                    .await,
            );
            return;
        }

        if msg.reply_to != Some(self.config.target_message) {
            if !admin {
                self.delete_channel_message(msg.id).await;
                self.post_transient(None, messages::non_reply_hint(), NON_REPLY_HINT_TTL);
            }
            return;
        }

        // The active holder may not speak during their own countdown.
        let holder_speaking = {
            let st = self.inner.lock().await;
            st.holder
                .as_ref()
                .is_some_and(|h| h.user == msg.author.id && Utc::now() < h.deadline)
        };
        if holder_speaking {
            if !admin {
                self.delete_channel_message(msg.id).await;
            }
            return;
        }

        // Valid takeover. The target message must still exist; a vanished
        // target is ignored gracefully.
        if self
            .client
            .fetch_message(self.config.channel, self.config.target_message)
            .await
            .is_err()
        {
            debug!("target message missing, ignoring takeover attempt");
            return;
        }

        self.start_or_takeover(&msg.author, self.config.target_message, None, None)
            .await;
        self.post_transient(
            Some(msg.id),
            messages::taken_over(msg.author.id),
            TAKEOVER_NOTE_TTL,
        );
    }

    /// Bilingual registration DM, once per user, tracked in the persisted
    /// notified set.
    async fn notify_registration_required(&self, msg: &ChannelMessage) {
        let first_time = {
            let mut st = self.inner.lock().await;
            let inserted = st.notified.insert(msg.author.id);
            if inserted {
                self.persist_notified(&st).await;
            }
            inserted
        };
        if first_time {
            best_effort(
                "registration notice",
                self.client
                    .send_direct_message(
                        msg.author.id,
                        &messages::registration_required(&self.config.notices),
                    )
                    .await,
            );
        }
    }

    async fn delete_channel_message(&self, message: MessageId) {
        best_effort(
            "message delete",
            self.client.delete_message(self.config.channel, message).await,
        );
    }

    /// Post a self-expiring notice without blocking event dispatch.
    fn post_transient(&self, reply_to: Option<MessageId>, body: MessageBody, ttl: Duration) {
        let client = self.client.clone();
        let channel = self.config.channel;
        tokio::spawn(async move {
            let sent = match reply_to {
                Some(id) => client.send_reply(channel, id, &body).await,
                None => client.send_message(channel, &body).await,
            };
            if let Ok(id) = sent {
                tokio::time::sleep(ttl).await;
                best_effort("transient cleanup", client.delete_message(channel, id).await);
            }
        });
    }
}
