//! Process configuration: gateway credentials from the environment, bot
//! behavior from `config.yml` (same camelCase keys operators already know).
//! Loaded once at startup, read-only afterwards.

use std::env;
use std::path::Path;

use serde::Deserialize;
use serenity::all::Colour;
use serenity::builder::CreateEmbed;

use crate::errors::BotError;

pub struct Config {
    pub discord_token: String,
    pub guild_id: u64,
    pub settings: Settings,
}

impl Config {
    pub fn load() -> Result<Self, BotError> {
        let discord_token = env::var("DISCORD_TOKEN")
            .map_err(|_| BotError::config("Expected DISCORD_TOKEN in env"))?;
        let guild_id = env::var("GUILD_ID")
            .map_err(|_| BotError::config("Expected GUILD_ID in env"))?
            .parse()
            .map_err(|_| BotError::config("GUILD_ID must be a numeric id"))?;
        let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "./config.yml".into());
        let settings = Settings::load(&config_path)?;
        Ok(Self { discord_token, guild_id, settings })
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub transcript_name: Option<String>,
    pub transcript_type: TranscriptType,
    pub log_file: Option<String>,
    pub store_file: Option<String>,
    pub logs: LogChannels,
    pub toggle_logs: ToggleLogs,
    pub alert_reply: AlertReply,
    pub roles_on_blacklist: Vec<u64>,
    pub support_roles: Vec<u64>,
    pub auto_close_tickets: AutoCloseTickets,
    pub default_dm_preference: Option<bool>,
    pub errors: ErrorMessages,
    pub alert_embed: EmbedSpec,
    pub alert_reply_embed: EmbedSpec,
    #[serde(rename = "alertDMEmbed")]
    pub alert_dm_embed: EmbedSpec,
    #[serde(rename = "dmErrorEmbed")]
    pub dm_error_embed: EmbedSpec,
    pub log_alert_embed: EmbedSpec,
    pub transcript_embed: EmbedSpec,
}

impl Settings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BotError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|err| {
            BotError::config(format!("cannot read {}: {err}", path.as_ref().display()))
        })?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, BotError> {
        serde_yaml::from_str(contents)
            .map_err(|err| BotError::config(format!("invalid config: {err}")))
    }

    pub fn transcript_name(&self) -> &str {
        self.transcript_name.as_deref().unwrap_or("{channelName}-transcript")
    }

    pub fn log_file(&self) -> &str {
        self.log_file.as_deref().unwrap_or("./logs.txt")
    }

    pub fn store_file(&self) -> &str {
        self.store_file.as_deref().unwrap_or("./store.json")
    }

    pub fn default_dm_preference(&self) -> bool {
        self.default_dm_preference.unwrap_or(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptType {
    #[default]
    Txt,
    Html,
}

/// Fallback operation when an alert times out with no reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutoAction {
    Close,
    Delete,
    #[default]
    None,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct LogChannels {
    pub default: Option<u64>,
    pub ticket_alert: Option<u64>,
    pub transcripts: Option<u64>,
    #[serde(rename = "DMErrors")]
    pub dm_errors: Option<u64>,
}

impl LogChannels {
    pub fn ticket_alert(&self) -> Option<u64> {
        self.ticket_alert.or(self.default)
    }

    pub fn transcripts(&self) -> Option<u64> {
        self.transcripts.or(self.default)
    }

    pub fn dm_errors(&self) -> Option<u64> {
        self.dm_errors.or(self.default)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ToggleLogs {
    pub ticket_alert: bool,
    #[serde(rename = "DMErrors")]
    pub dm_errors: bool,
}

impl Default for ToggleLogs {
    fn default() -> Self {
        Self { ticket_alert: true, dm_errors: true }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AlertReply {
    pub enabled: bool,
    /// Seconds the bounded wait runs before the auto action applies.
    pub time: u64,
    pub auto_action: AutoAction,
}

impl Default for AlertReply {
    fn default() -> Self {
        Self { enabled: true, time: 120, auto_action: AutoAction::None }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AutoCloseTickets {
    pub enabled: bool,
    /// Seconds of channel inactivity before an open ticket is auto-closed.
    pub time: u64,
    pub ignore_bots: bool,
}

impl Default for AutoCloseTickets {
    fn default() -> Self {
        Self { enabled: false, time: 86_400, ignore_bots: true }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ErrorMessages {
    pub not_in_a_ticket: Option<String>,
    pub not_allowed: Option<String>,
}

impl ErrorMessages {
    pub fn not_in_a_ticket(&self) -> &str {
        self.not_in_a_ticket.as_deref().unwrap_or("You are not in a ticket channel!")
    }

    pub fn not_allowed(&self) -> &str {
        self.not_allowed.as_deref().unwrap_or("You are not allowed to use this!")
    }
}

/// Operator override for one embed; unset fields fall back to the defaults
/// the calling workflow supplies.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct EmbedSpec {
    pub enabled: Option<bool>,
    pub color: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub ping_user: Option<bool>,
}

/// Per-call-site defaults an [`EmbedSpec`] override merges onto.
#[derive(Debug, Clone, Copy)]
pub struct EmbedDefaults {
    pub color: u32,
    pub title: &'static str,
    pub description: Option<&'static str>,
}

impl EmbedSpec {
    pub fn enabled(&self) -> bool {
        self.enabled.unwrap_or(false)
    }

    pub fn resolved_color(&self, default: u32) -> Colour {
        Colour::new(self.color.as_deref().and_then(parse_hex_color).unwrap_or(default))
    }

    pub fn resolved_description(&self, defaults: &EmbedDefaults) -> Option<String> {
        self.description
            .clone()
            .or_else(|| defaults.description.map(str::to_string))
    }

    /// Builds the embed with merged title and color. Descriptions go
    /// through [`Self::resolved_description`] first so call sites can fill
    /// placeholders before attaching them.
    pub fn build(&self, defaults: &EmbedDefaults, description: Option<String>) -> CreateEmbed {
        let mut embed = CreateEmbed::new()
            .title(self.title.clone().unwrap_or_else(|| defaults.title.to_string()))
            .colour(self.resolved_color(defaults.color));
        if let Some(description) = description {
            embed = embed.description(description);
        }
        embed
    }
}

fn parse_hex_color(value: &str) -> Option<u32> {
    u32::from_str_radix(value.trim_start_matches('#'), 16).ok()
}
