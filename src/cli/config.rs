//! Holdout configuration file handling
//!
//! Operator configuration is TOML, loaded once at startup and validated
//! into the core's `GiveawayConfig`. Missing required identifiers are
//! fatal: the process does not start with a half-configured giveaway.
//!
//! The bot token is NOT stored here; it comes from the `DISCORD_TOKEN`
//! environment variable.

use holdout::chat::{ChannelId, MessageId, RoleId};
use holdout::giveaway::clock;
use holdout::giveaway::{GiveawayConfig, NoticeText};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write config file '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("invalid setting {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

/// Operator configuration for the holdout bot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldoutConfig {
    pub discord: DiscordConfig,

    #[serde(default)]
    pub roles: RolesConfig,

    #[serde(default)]
    pub countdown: CountdownConfig,

    #[serde(default)]
    pub bonus: BonusConfig,

    #[serde(default)]
    pub quiet: QuietConfig,

    #[serde(default)]
    pub notices: NoticesConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Required platform identifiers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub guild_id: u64,
    pub channel_id: u64,
    /// The pinned message participants must reply to
    pub target_message_id: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RolesConfig {
    /// Roles exempt from all restrictions (besides the platform's own
    /// administrator permission)
    #[serde(default)]
    pub admin: Vec<u64>,

    /// Roles banned from posting during quiet hours
    #[serde(default)]
    pub quiet: Vec<u64>,

    /// Roles allowed to participate; empty means everyone
    #[serde(default)]
    pub eligible: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountdownConfig {
    #[serde(default = "default_countdown_seconds")]
    pub seconds: i64,

    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: f64,

    #[serde(default = "default_alert_at_seconds")]
    pub alert_at_seconds: i64,
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self {
            seconds: default_countdown_seconds(),
            tick_seconds: default_tick_seconds(),
            alert_at_seconds: default_alert_at_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BonusConfig {
    #[serde(default = "default_bonus_seconds")]
    pub invite_seconds: i64,

    #[serde(default = "default_bonus_seconds")]
    pub role_seconds: i64,

    #[serde(default = "default_min_account_age_days")]
    pub min_account_age_days: i64,
}

impl Default for BonusConfig {
    fn default() -> Self {
        Self {
            invite_seconds: default_bonus_seconds(),
            role_seconds: default_bonus_seconds(),
            min_account_age_days: default_min_account_age_days(),
        }
    }
}

/// Quiet window in 24h HH:MM. start > end crosses midnight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuietConfig {
    #[serde(default = "default_quiet_start")]
    pub start: String,

    #[serde(default = "default_quiet_end")]
    pub end: String,
}

impl Default for QuietConfig {
    fn default() -> Self {
        Self {
            start: default_quiet_start(),
            end: default_quiet_end(),
        }
    }
}

/// User-facing notice texts. The `_alt` variants carry a second language
/// and render above the primary text when set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoticesConfig {
    #[serde(default = "default_registration_notice")]
    pub registration: String,

    #[serde(default)]
    pub registration_alt: Option<String>,

    #[serde(default = "default_quiet_notice")]
    pub quiet_hours: String,

    #[serde(default)]
    pub quiet_hours_alt: Option<String>,
}

impl Default for NoticesConfig {
    fn default() -> Self {
        Self {
            registration: default_registration_notice(),
            registration_alt: None,
            quiet_hours: default_quiet_notice(),
            quiet_hours_alt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_countdown_seconds() -> i64 {
    60
}

fn default_tick_seconds() -> f64 {
    1.0
}

fn default_alert_at_seconds() -> i64 {
    10
}

fn default_bonus_seconds() -> i64 {
    10
}

fn default_min_account_age_days() -> i64 {
    3
}

fn default_quiet_start() -> String {
    "00:00".to_string()
}

fn default_quiet_end() -> String {
    "09:00".to_string()
}

fn default_registration_notice() -> String {
    "To participate in the giveaway, please register and complete your profile.".to_string()
}

fn default_quiet_notice() -> String {
    "The channel is in quiet hours. Please try again later.".to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("holdout").join("holdout.db"))
        .unwrap_or_else(|| PathBuf::from("holdout.db"))
}

pub fn default_config_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("holdout").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("config.toml"))
}

impl HoldoutConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write a commented default configuration
    pub fn create_default(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, Self::generate_default_toml()).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Validate and convert into the core's resolved configuration
    pub fn giveaway_config(&self) -> Result<GiveawayConfig, ConfigError> {
        if self.discord.guild_id == 0 {
            return Err(ConfigError::Missing("discord.guild_id"));
        }
        if self.discord.channel_id == 0 {
            return Err(ConfigError::Missing("discord.channel_id"));
        }
        if self.discord.target_message_id == 0 {
            return Err(ConfigError::Missing("discord.target_message_id"));
        }
        if self.countdown.seconds <= 0 {
            return Err(ConfigError::Invalid {
                field: "countdown.seconds",
                reason: "must be positive".to_string(),
            });
        }
        if !(self.countdown.tick_seconds > 0.0) {
            return Err(ConfigError::Invalid {
                field: "countdown.tick_seconds",
                reason: "must be positive".to_string(),
            });
        }

        let quiet_start =
            clock::parse_hhmm(&self.quiet.start).ok_or_else(|| ConfigError::Invalid {
                field: "quiet.start",
                reason: format!("'{}' is not HH:MM", self.quiet.start),
            })?;
        let quiet_end = clock::parse_hhmm(&self.quiet.end).ok_or_else(|| ConfigError::Invalid {
            field: "quiet.end",
            reason: format!("'{}' is not HH:MM", self.quiet.end),
        })?;

        Ok(GiveawayConfig {
            channel: ChannelId(self.discord.channel_id),
            target_message: MessageId(self.discord.target_message_id),
            admin_roles: self.roles.admin.iter().map(|r| RoleId(*r)).collect(),
            quiet_roles: self.roles.quiet.iter().map(|r| RoleId(*r)).collect(),
            eligible_roles: self.roles.eligible.iter().map(|r| RoleId(*r)).collect(),
            countdown_seconds: self.countdown.seconds,
            tick_rate: Duration::from_secs_f64(self.countdown.tick_seconds),
            alert_at_seconds: self.countdown.alert_at_seconds,
            invite_bonus_seconds: self.bonus.invite_seconds,
            role_bonus_seconds: self.bonus.role_seconds,
            min_account_age_days: self.bonus.min_account_age_days,
            quiet_start,
            quiet_end,
            notices: NoticeText {
                registration: self.notices.registration.clone(),
                registration_alt: self.notices.registration_alt.clone(),
                quiet_hours: self.notices.quiet_hours.clone(),
                quiet_hours_alt: self.notices.quiet_hours_alt.clone(),
            },
        })
    }

    /// Default configuration content with comments
    pub fn generate_default_toml() -> String {
        format!(
            r#"# Holdout Giveaway Bot Configuration
#
# The bot token is read from the DISCORD_TOKEN environment variable,
# never from this file.

[discord]
# Guild, giveaway channel and pinned target message ids (required)
guild_id = 0
channel_id = 0
target_message_id = 0

[roles]
# Role ids exempt from all restrictions
admin = []
# Role ids banned from posting during quiet hours
quiet = []
# Role ids allowed to participate; empty means everyone
eligible = []

[countdown]
seconds = 60
tick_seconds = 1.0
alert_at_seconds = 10

[bonus]
# Seconds removed from the holder's countdown per successful invite
invite_seconds = 10
# Seconds removed when a referred member later gains the eligible role
role_seconds = 10
# Invitee accounts younger than this never earn bonuses
min_account_age_days = 3

[quiet]
# 24h HH:MM window; start > end crosses midnight
start = "00:00"
end = "09:00"

[notices]
# registration_alt / quiet_hours_alt may carry a second language
registration = "To participate in the giveaway, please register and complete your profile."
quiet_hours = "The channel is in quiet hours. Please try again later."

[storage]
db_path = "{db}"

[logging]
level = "info"
"#,
            db = default_db_path().display()
        )
    }
}
