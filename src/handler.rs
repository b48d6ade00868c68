use std::time::Duration;

use serenity::{
    all::{
        CommandDataOptionValue, CommandInteraction, CommandOptionType,
        CreateInteractionResponse, CreateInteractionResponseMessage, Interaction,
    },
    async_trait,
    builder::{CreateCommand, CreateCommandOption},
    model::{channel::Message, gateway::Ready, id::GuildId},
    prelude::*,
};
use tracing::{error, info};

use crate::{
    alert::{alert_ticket, close_inactive_tickets, App},
    archive::archive_to_log_channel,
    lookup,
    tickets::TicketStatus,
};

pub struct Handler {
    pub guild_id: u64,
    pub app: App,
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("{} is connected!", ready.user.name);

        let guild_id = GuildId::new(self.guild_id);

        let alert_cmd = CreateCommand::new("alert")
            .description("Alert the ticket creator and act if they stay silent")
            .add_option(
                CreateCommandOption::new(CommandOptionType::User, "user", "The user to alert")
                    .required(true),
            )
            .add_option(CreateCommandOption::new(
                CommandOptionType::Integer,
                "time",
                "Seconds to wait before the auto action",
            ));
        if let Err(err) = guild_id.create_command(&ctx.http, alert_cmd).await {
            error!("Failed to register /alert: {err:?}");
        } else {
            info!("Slash command /alert registered.");
        }

        let transcript_cmd = CreateCommand::new("transcript")
            .description("Save a transcript of this ticket to the log channel");
        if let Err(err) = guild_id.create_command(&ctx.http, transcript_cmd).await {
            error!("Failed to register /transcript: {err:?}");
        } else {
            info!("Slash command /transcript registered.");
        }

        let reopen_cmd = CreateCommand::new("reopen").description("Re-Open a closed ticket.");
        if let Err(err) = guild_id.create_command(&ctx.http, reopen_cmd).await {
            error!("Failed to register /reopen: {err:?}");
        } else {
            info!("Slash command /reopen registered.");
        }

        // Periodic sweep of expired blacklist entries.
        let app = self.app.clone();
        let sweep_ctx = ctx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(300));
            loop {
                interval.tick().await;
                clean_blacklist(&sweep_ctx, &app, guild_id).await;
            }
        });

        // Periodic sweep of inactive open tickets.
        if self.app.settings.auto_close_tickets.enabled {
            let app = self.app.clone();
            let http = ctx.http.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(600));
                loop {
                    interval.tick().await;
                    close_inactive_tickets(&http, &app).await;
                }
            });
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            match command.data.name.as_str() {
                "alert" => self.handle_alert(&ctx, &command).await,
                "transcript" => self.handle_transcript(&ctx, &command).await,
                "reopen" => self.handle_reopen(&ctx, &command).await,
                _ => {}
            }
        }
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        // Feed the pending alert waits on this channel.
        self.app.waits.deliver(msg.channel_id.get(), msg.author.id.get()).await;
    }
}

impl Handler {
    async fn handle_alert(&self, ctx: &Context, command: &CommandInteraction) {
        if !self.require_ticket_and_support(ctx, command).await {
            return;
        }

        let mut target = None;
        let mut time = None;
        for option in &command.data.options {
            match (option.name.as_str(), &option.value) {
                ("user", CommandDataOptionValue::User(id)) => target = Some(*id),
                ("time", CommandDataOptionValue::Integer(secs)) => time = Some(*secs),
                _ => {}
            }
        }
        let time = requested_wait_secs(time);
        let Some(target) = target else {
            reply_ephemeral(ctx, command, "No user supplied.").await;
            return;
        };

        let reporter = self.app.reporter.as_ref();
        let Some(user) = lookup::get_user(ctx, reporter, target).await else {
            reply_ephemeral(ctx, command, "Could not resolve that user.").await;
            return;
        };
        let Some(channel) = lookup::get_channel(ctx, reporter, command.channel_id).await else {
            reply_ephemeral(ctx, command, "Could not resolve this channel.").await;
            return;
        };

        reply_ephemeral(ctx, command, &format!("Alerted {}.", user.tag())).await;
        alert_ticket(ctx, &self.app, &channel, &command.user, &user, time).await;
    }

    async fn handle_transcript(&self, ctx: &Context, command: &CommandInteraction) {
        if !self.require_ticket_and_support(ctx, command).await {
            return;
        }

        let reporter = self.app.reporter.as_ref();
        let Some(channel) = lookup::get_channel(ctx, reporter, command.channel_id).await else {
            reply_ephemeral(ctx, command, "Could not resolve this channel.").await;
            return;
        };

        archive_to_log_channel(&ctx.http, &self.app, &channel, &command.user.tag()).await;

        let confirmation = match self.app.settings.logs.transcripts() {
            Some(log_channel) => format!("Transcript saved to <#{log_channel}>."),
            None => "Transcript saved.".to_string(),
        };
        reply_ephemeral(ctx, command, &confirmation).await;

        let creator_tag = creator_tag(ctx, &self.app, channel.id.get()).await;
        self.app
            .reporter
            .log_message(&format!(
                "{} manually saved the transcript of ticket #{} which was created by {}",
                command.user.tag(),
                channel.name,
                creator_tag
            ))
            .await;
    }

    async fn handle_reopen(&self, ctx: &Context, command: &CommandInteraction) {
        let settings = &self.app.settings;
        let channel_id = command.channel_id.get();

        let Some(ticket) = self.app.tickets.get(channel_id).await else {
            reply_ephemeral(ctx, command, settings.errors.not_in_a_ticket()).await;
            return;
        };
        if ticket.status == TicketStatus::Open {
            reply_ephemeral(ctx, command, "This ticket is already open!").await;
            return;
        }
        if !self.has_support_role(command) {
            reply_ephemeral(ctx, command, settings.errors.not_allowed()).await;
            return;
        }

        if let Err(err) = self.app.tickets.set_status(channel_id, TicketStatus::Open).await {
            self.app
                .reporter
                .report("ERROR", &format!("[Reopen]: failed to update ticket status: {err}"))
                .await;
            reply_ephemeral(ctx, command, "Failed to reopen this ticket.").await;
            return;
        }

        reply_ephemeral(ctx, command, "This ticket has been reopened.").await;
        self.app
            .reporter
            .log_message(&format!("{} reopened the ticket {channel_id}", command.user.tag()))
            .await;
    }

    /// Common guard: the command must run inside a ticket channel and come
    /// from a member holding one of the configured support roles.
    async fn require_ticket_and_support(
        &self,
        ctx: &Context,
        command: &CommandInteraction,
    ) -> bool {
        let settings = &self.app.settings;
        if !self.app.tickets.exists(command.channel_id.get()).await {
            reply_ephemeral(ctx, command, settings.errors.not_in_a_ticket()).await;
            return false;
        }
        if !self.has_support_role(command) {
            reply_ephemeral(ctx, command, settings.errors.not_allowed()).await;
            return false;
        }
        true
    }

    fn has_support_role(&self, command: &CommandInteraction) -> bool {
        let support_roles = &self.app.settings.support_roles;
        if support_roles.is_empty() {
            return true;
        }
        command
            .member
            .as_ref()
            .map(|member| member.roles.iter().any(|role| support_roles.contains(&role.get())))
            .unwrap_or(false)
    }
}

/// A missing or non-positive `time` option falls back to the configured
/// wait, so `/alert time:0` never produces a zero-second countdown.
fn requested_wait_secs(value: Option<i64>) -> Option<u64> {
    value.filter(|secs| *secs > 0).map(|secs| secs as u64)
}

async fn reply_ephemeral(ctx: &Context, command: &CommandInteraction, content: &str) {
    let resp = CreateInteractionResponse::Message(
        CreateInteractionResponseMessage::new().content(content).ephemeral(true),
    );
    if let Err(err) = command.create_response(&ctx.http, resp).await {
        error!("Cannot respond to /{}: {err:?}", command.data.name);
    }
}

async fn creator_tag(ctx: &Context, app: &App, channel_id: u64) -> String {
    let creator_id = match app.tickets.get(channel_id).await {
        Some(ticket) => ticket.user_id.parse().ok(),
        None => None,
    };
    match creator_id {
        Some(id) => lookup::get_user(ctx, app.reporter.as_ref(), id)
            .await
            .map(|user| user.tag())
            .unwrap_or_else(|| "Unknown".into()),
        None => "Unknown".into(),
    }
}

/// Deletes expired blacklist entries and unwinds any configured blacklist
/// roles from affected members. Each role removal is guarded on its own.
pub async fn clean_blacklist(ctx: &Context, app: &App, guild_id: GuildId) {
    let blacklist = crate::tickets::Blacklist::new(app.store.clone());
    let now_ms = chrono::Utc::now().timestamp_millis();
    let (users, roles) = blacklist.expired_entries(now_ms).await;
    let reporter = app.reporter.as_ref();

    for user_id in users {
        if let Err(err) = blacklist.remove_user(user_id).await {
            reporter
                .report("ERROR", &format!("[Blacklist]: failed to remove user entry: {err}"))
                .await;
            continue;
        }
        let Some(member) = lookup::get_member(ctx, reporter, guild_id, user_id.into()).await
        else {
            continue;
        };
        for role_id in &app.settings.roles_on_blacklist {
            match lookup::get_role(ctx, reporter, guild_id, (*role_id).into()).await {
                Some(role) => {
                    if let Err(err) = member.remove_role(&ctx.http, role.id).await {
                        error!("Error removing role from blacklisted user: {err}");
                    }
                }
                None => error!("Role with ID {role_id} not found."),
            }
        }
    }

    for role_id in roles {
        if let Err(err) = blacklist.remove_role(role_id).await {
            reporter
                .report("ERROR", &format!("[Blacklist]: failed to remove role entry: {err}"))
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_or_negative_time_falls_back_to_the_configured_wait() {
        assert_eq!(requested_wait_secs(None), None);
        assert_eq!(requested_wait_secs(Some(0)), None);
        assert_eq!(requested_wait_secs(Some(-5)), None);
        assert_eq!(requested_wait_secs(Some(300)), Some(300));
    }
}
