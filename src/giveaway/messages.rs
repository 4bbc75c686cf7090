//! Status and notice text builders.

use super::state::UserBonusStats;
use crate::chat::{MessageBody, UserId};

/// Configurable user-facing notices. Secondary-language variants render
/// above the English text when present.
#[derive(Debug, Clone)]
pub struct NoticeText {
    pub registration: String,
    pub registration_alt: Option<String>,
    pub quiet_hours: String,
    pub quiet_hours_alt: Option<String>,
}

impl Default for NoticeText {
    fn default() -> Self {
        Self {
            registration:
                "To participate in the giveaway, please register and complete your profile."
                    .to_string(),
            registration_alt: None,
            quiet_hours: "The channel is in quiet hours. Please try again later.".to_string(),
            quiet_hours_alt: None,
        }
    }
}

fn mention(user: UserId) -> String {
    format!("<@{user}>")
}

fn bilingual(primary: &str, alt: Option<&str>) -> String {
    match alt {
        Some(alt) => format!("{alt}\n\n{primary}"),
        None => primary.to_string(),
    }
}

/// Live countdown status, edited in place every tick
pub fn countdown(user: UserId, seconds_left: i64, stats: &UserBonusStats) -> MessageBody {
    MessageBody {
        title: Some("Giveaway Countdown".to_string()),
        body: format!(
            "Active participant: {}\n⏳ Remaining: **{}s**\nReply to the pinned target message to take over.",
            mention(user),
            seconds_left
        ),
        fields: vec![
            (
                "Invites Applied".to_string(),
                format!("{} (−{}s)", stats.invites_applied, stats.invite_seconds_applied),
            ),
            (
                "Role Bonuses Applied".to_string(),
                format!("{} (−{}s)", stats.role_bonuses_applied, stats.role_seconds_applied),
            ),
            ("Total Bonus".to_string(), format!("−{}s", stats.total_seconds())),
        ],
        notice: None,
    }
}

/// Short-lived confirmation after a takeover
pub fn taken_over(user: UserId) -> MessageBody {
    MessageBody {
        title: Some("New Participant".to_string()),
        body: format!("{} has taken over. Countdown restarted.", mention(user)),
        ..MessageBody::default()
    }
}

/// Short-lived hint after deleting a non-reply
pub fn non_reply_hint() -> MessageBody {
    MessageBody {
        title: Some("How To Participate".to_string()),
        body: "Please reply to the pinned target message to participate.".to_string(),
        ..MessageBody::default()
    }
}

pub fn quiet_hours(notices: &NoticeText) -> MessageBody {
    MessageBody {
        title: Some("Quiet Hours".to_string()),
        body: bilingual(&notices.quiet_hours, notices.quiet_hours_alt.as_deref()),
        ..MessageBody::default()
    }
}

pub fn registration_required(notices: &NoticeText) -> MessageBody {
    MessageBody {
        title: Some("Registration Required".to_string()),
        body: bilingual(&notices.registration, notices.registration_alt.as_deref()),
        ..MessageBody::default()
    }
}

pub fn winner(user: UserId) -> MessageBody {
    MessageBody {
        title: Some("Winner Announced".to_string()),
        body: format!(
            "🏆 Winner: {}. The channel is now locked.",
            mention(user)
        ),
        ..MessageBody::default()
    }
}

/// Broadcast alert when remaining time hits the configured threshold
pub fn alert(seconds: i64) -> MessageBody {
    MessageBody {
        title: Some("Countdown Alert".to_string()),
        body: format!("Only **{seconds} seconds** left!"),
        notice: Some("@here".to_string()),
        ..MessageBody::default()
    }
}

pub fn unlocked() -> MessageBody {
    MessageBody::text("Channel unlocked by admin.")
}
