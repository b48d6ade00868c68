//! Transcript archival: fetch a ticket channel's history, serialize it, and
//! hand the artifact to the transcripts log channel.

use serenity::all::{Timestamp, UserId};
use serenity::builder::{CreateAttachment, CreateEmbedFooter, CreateMessage};
use serenity::http::Http;
use serenity::model::channel::GuildChannel;
use tracing::warn;

use crate::alert::{App, GREEN};
use crate::config::{EmbedDefaults, TranscriptType};
use crate::errors::BotError;
use crate::history::{fetch_all, ChannelPager};
use crate::template::{fill, sanitize_input};
use crate::transcript::{resolve_file_name, serialize, TranscriptContext};

/// Builds the flat-text transcript attachment for a ticket channel.
///
/// The HTML transcript type delegates to an external renderer that is not
/// wired in; it falls back to the flat form with a warning.
pub async fn save_transcript_txt(
    http: &Http,
    app: &App,
    channel: &GuildChannel,
    deleted_by_tag: &str,
) -> Result<CreateAttachment, BotError> {
    if app.settings.transcript_type == TranscriptType::Html {
        warn!("html transcripts are not wired to a renderer; falling back to txt");
    }

    let pager = ChannelPager::new(http, channel.id);
    let messages = fetch_all(&pager).await?;

    let ticket = app.tickets.get(channel.id.get()).await;
    let creator_id: Option<UserId> = ticket.as_ref().and_then(|t| t.user_id.parse().ok());
    let creator = match creator_id {
        Some(id) => http.get_user(id).await.ok(),
        None => None,
    };
    let claimed_by = match ticket.as_ref().and_then(|t| t.claim_user.as_ref()) {
        Some(id) => match id.parse::<UserId>() {
            Ok(id) => http.get_user(id).await.ok().map(|user| user.tag()),
            Err(_) => None,
        },
        None => None,
    };

    let server_name = channel
        .guild_id
        .to_partial_guild(http)
        .await
        .map(|guild| guild.name)
        .unwrap_or_default();

    let display_name = match creator_id {
        Some(id) => http
            .get_member(channel.guild_id, id)
            .await
            .ok()
            .map(|member| member.display_name().to_string()),
        None => None,
    };
    let file_name = resolve_file_name(
        app.settings.transcript_name(),
        &channel.name,
        creator.as_ref().map(|user| user.name.as_str()),
        display_name.as_deref(),
    );

    let context = TranscriptContext {
        server_name,
        channel_name: channel.name.clone(),
        category: ticket.as_ref().map(|t| t.ticket_type.clone()).unwrap_or_default(),
        creator_tag: creator.as_ref().map(|user| user.tag()).unwrap_or_else(|| "Unknown".into()),
        deleted_by_tag: deleted_by_tag.to_string(),
        claimed_by_tag: claimed_by,
    };

    let artifact = serialize(&messages, &context, file_name);
    let name = artifact.file_name.clone();
    Ok(CreateAttachment::bytes(artifact.into_bytes(), name))
}

/// Saves the transcript and posts it to the transcripts log channel with a
/// summary embed. Failures are reported, never raised.
pub async fn archive_to_log_channel(
    http: &Http,
    app: &App,
    channel: &GuildChannel,
    saved_by_tag: &str,
) {
    let attachment = match save_transcript_txt(http, app, channel, saved_by_tag).await {
        Ok(attachment) => attachment,
        Err(err) => {
            app.reporter
                .report("ERROR", &format!("[Transcript]: failed to build transcript: {err}"))
                .await;
            return;
        }
    };

    let Some(log_channel) = app.settings.logs.transcripts() else {
        return;
    };

    let ticket = app.tickets.get(channel.id.get()).await;
    let defaults = EmbedDefaults {
        color: GREEN,
        title: "Ticket Transcript",
        description: Some("Saved by {user}"),
    };
    let description = app
        .settings
        .transcript_embed
        .resolved_description(&defaults)
        .map(|d| fill(&d, &[("user", saved_by_tag)]));
    let mut embed = app
        .settings
        .transcript_embed
        .build(&defaults, description)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(saved_by_tag.to_string()))
        .field("Ticket Name", format!("#{}", sanitize_input(&channel.name)), true);
    if let Some(ticket) = &ticket {
        embed = embed
            .field("Ticket Creator", format!("<@!{}>", ticket.user_id), true)
            .field("Category", ticket.ticket_type.clone(), true)
            .field("Creation Time", format!("<t:{}:F>", ticket.creation_time), false);
    }

    let message = CreateMessage::new().embed(embed).add_file(attachment);
    if let Err(err) = serenity::all::ChannelId::new(log_channel)
        .send_message(http, message)
        .await
    {
        app.reporter
            .report(
                "ERROR",
                &format!(
                    "[Logging Error]: please make sure to at least configure your default \
                     log channel: {err}"
                ),
            )
            .await;
    }
}
