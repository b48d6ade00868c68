//! The "alert a user, then act on silence" workflow.
//!
//! Sequencing: send the countdown notification, start the bounded wait,
//! post the staff log + audit line unconditionally, then attempt the DM.
//! Every outward send is guarded on its own; one failure degrades one
//! feature and is reported, never raised back to the invoking command.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::all::{ChannelId, Timestamp, User};
use serenity::builder::{CreateEmbed, CreateEmbedFooter, CreateMessage};
use serenity::http::Http;
use serenity::model::channel::GuildChannel;
use serenity::prelude::Context;
use tracing::warn;

use crate::archive;
use crate::collector::{PendingWaits, WaitOutcome};
use crate::config::{AutoAction, EmbedDefaults, Settings};
use crate::errors::BotError;
use crate::history::{self, ChannelPager};
use crate::lookup;
use crate::report::Report;
use crate::store::JsonStore;
use crate::template::{fill, format_time, sanitize_input};
use crate::tickets::{dm_preference, TicketStatus, Tickets};

pub const GREEN: u32 = 0x2FF200;
pub const RED: u32 = 0xFF0000;
pub const SCARLET: u32 = 0xFF2400;

/// Shared collaborators every ticket workflow needs.
#[derive(Clone)]
pub struct App {
    pub settings: Arc<Settings>,
    pub store: Arc<JsonStore>,
    pub tickets: Tickets,
    pub waits: Arc<PendingWaits>,
    pub reporter: Arc<dyn Report>,
}

/// Outward message delivery, faked in tests for the guarded DM flow.
#[async_trait]
pub trait Outbound: Send + Sync {
    async fn direct_message(&self, user: &User, message: CreateMessage)
        -> Result<(), serenity::Error>;
    async fn channel_message(
        &self,
        channel_id: ChannelId,
        message: CreateMessage,
    ) -> Result<(), serenity::Error>;
}

pub struct HttpOutbound {
    http: Arc<Http>,
}

impl HttpOutbound {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Outbound for HttpOutbound {
    async fn direct_message(
        &self,
        user: &User,
        message: CreateMessage,
    ) -> Result<(), serenity::Error> {
        user.dm(&*self.http, message).await.map(|_| ())
    }

    async fn channel_message(
        &self,
        channel_id: ChannelId,
        message: CreateMessage,
    ) -> Result<(), serenity::Error> {
        channel_id.send_message(&*self.http, message).await.map(|_| ())
    }
}

/// Which auto action actually applies for a wait outcome. The configured
/// action only fires after a timeout, and only while the ticket still
/// exists.
pub fn resolve_auto_action(
    outcome: WaitOutcome,
    ticket_exists: bool,
    configured: AutoAction,
) -> AutoAction {
    match outcome {
        WaitOutcome::Replied(_) => AutoAction::None,
        WaitOutcome::TimedOut if ticket_exists => configured,
        WaitOutcome::TimedOut => AutoAction::None,
    }
}

/// Full alert workflow for one ticket channel.
pub async fn alert_ticket(
    ctx: &Context,
    app: &App,
    channel: &GuildChannel,
    staff: &User,
    target: &User,
    time_override: Option<u64>,
) {
    let settings = &app.settings;
    let timeout_secs = time_override.unwrap_or(settings.alert_reply.time);
    let expiry_epoch = Utc::now().timestamp() + timeout_secs as i64;

    // 1. Countdown notification plus a ping, in the ticket channel.
    let defaults = EmbedDefaults {
        color: GREEN,
        title: "Ticket Close Notification",
        description: Some("This ticket will be closed soon if no response has been received."),
    };
    let description = settings
        .alert_embed
        .resolved_description(&defaults)
        .map(|d| fill(&d, &[("time", &format!("<t:{expiry_epoch}:R>"))]));
    let embed = settings.alert_embed.build(&defaults, description).timestamp(Timestamp::now());

    let alert_message = match channel
        .id
        .send_message(&ctx.http, CreateMessage::new().embed(embed))
        .await
    {
        Ok(message) => {
            let ping = CreateMessage::new().content(format!("<@{}>", target.id));
            if let Err(err) = channel.id.send_message(&ctx.http, ping).await {
                warn!(error = %err, "failed to ping alerted user");
            }
            Some(message)
        }
        Err(err) => {
            app.reporter
                .report("ERROR", &format!("[Alert]: failed to send alert notification: {err}"))
                .await;
            None
        }
    };

    // 2. Bounded wait, detached so logging and the DM continue meanwhile.
    if settings.alert_reply.enabled {
        let app = app.clone();
        let http = ctx.http.clone();
        let channel_id = channel.id;
        let target_id = target.id.get();
        tokio::spawn(async move {
            let outcome = app.waits.bounded_wait(channel_id.get(), target_id, timeout_secs).await;
            match outcome {
                WaitOutcome::Replied(_) => {
                    if let Some(message) = alert_message {
                        let _ = message.delete(&http).await;
                    }
                    let defaults = EmbedDefaults {
                        color: GREEN,
                        title: "Alert Reply Notification",
                        description:
                            Some("The user replied to the alert and seems to be available."),
                    };
                    let description =
                        app.settings.alert_reply_embed.resolved_description(&defaults);
                    let embed = app
                        .settings
                        .alert_reply_embed
                        .build(&defaults, description)
                        .timestamp(Timestamp::now());
                    if let Err(err) = channel_id
                        .send_message(&http, CreateMessage::new().embed(embed))
                        .await
                    {
                        app.reporter
                            .report(
                                "ERROR",
                                &format!("[Alert]: failed to send reply notification: {err}"),
                            )
                            .await;
                    }
                }
                WaitOutcome::TimedOut => {
                    let exists = app.tickets.exists(channel_id.get()).await;
                    let action =
                        resolve_auto_action(outcome, exists, app.settings.alert_reply.auto_action);
                    let result = match action {
                        AutoAction::Close => {
                            auto_close_ticket(
                                &http,
                                &app,
                                channel_id,
                                "This ticket was automatically closed due to inactivity.",
                                &format!(
                                    "The ticket {channel_id} was automatically closed after \
                                     an unanswered alert"
                                ),
                            )
                            .await
                        }
                        AutoAction::Delete => auto_delete_ticket(&http, &app, channel_id).await,
                        AutoAction::None => Ok(()),
                    };
                    if let Err(err) = result {
                        app.reporter
                            .report("ERROR", &format!("[Alert]: auto action failed: {err}"))
                            .await;
                    }
                }
            }
        });
    }

    // 3. Staff log embed and the audit line, regardless of the wait.
    send_staff_log(ctx, app, channel, staff, target, timeout_secs).await;
    app.reporter
        .log_message(&format!(
            "{} sent an alert to {} in the ticket #{}",
            staff.tag(),
            target.tag(),
            channel.name
        ))
        .await;

    // 4. Best-effort direct notification.
    let guild_name = channel
        .guild_id
        .to_partial_guild(&ctx.http)
        .await
        .map(|guild| guild.name)
        .unwrap_or_default();
    let outbound = HttpOutbound::new(ctx.http.clone());
    dm_alert(&outbound, app, target, &channel.name, &guild_name).await;
}

async fn send_staff_log(
    ctx: &Context,
    app: &App,
    channel: &GuildChannel,
    staff: &User,
    target: &User,
    timeout_secs: u64,
) {
    if !app.settings.toggle_logs.ticket_alert {
        return;
    }
    let Some(log_channel) = app.settings.logs.ticket_alert() else {
        return;
    };

    let ticket = app.tickets.get(channel.id.get()).await;
    let ticket_type = ticket.as_ref().map(|t| t.ticket_type.clone()).unwrap_or_default();
    let creator = match ticket.as_ref().and_then(|t| t.user_id.parse().ok()) {
        Some(id) => lookup::get_user(ctx, app.reporter.as_ref(), id).await,
        None => None,
    };
    let creator_line = match &creator {
        Some(user) => format!("> <@!{}>\n> {}", user.id, sanitize_input(&user.tag())),
        None => "> Unknown".to_string(),
    };

    let defaults =
        EmbedDefaults { color: SCARLET, title: "Ticket Logs | Ticket Alert", description: None };
    let embed = app
        .settings
        .log_alert_embed
        .build(&defaults, None)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(staff.tag()))
        .field(
            "• Alert Sent By",
            format!("> <@!{}>\n> {}", staff.id, sanitize_input(&staff.tag())),
            false,
        )
        .field(
            "• Alert Sent To",
            format!("> <@!{}>\n> {}", target.id, sanitize_input(&target.tag())),
            false,
        )
        .field("• Ticket Creator", creator_line, false)
        .field(
            "• Ticket",
            format!("> #{}\n> {}", sanitize_input(&channel.name), ticket_type),
            false,
        )
        .field("• Time", format!("> {timeout_secs} seconds"), false);

    if let Err(err) = ChannelId::new(log_channel)
        .send_message(&ctx.http, CreateMessage::new().embed(embed))
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

/// Guarded DM sub-flow. Honors the user's stored preference; a rejected DM
/// is reported once and surfaced in the DM-errors log channel when that
/// toggle is on. Never fails outward.
pub async fn dm_alert(
    outbound: &dyn Outbound,
    app: &App,
    user: &User,
    ticket_name: &str,
    server_name: &str,
) {
    let settings = &app.settings;
    if !settings.alert_dm_embed.enabled() {
        return;
    }
    let allowed =
        dm_preference(&app.store, user.id.get(), "alert", settings.default_dm_preference()).await;
    if !allowed {
        return;
    }

    let defaults = EmbedDefaults {
        color: RED,
        title: "Ticket Close Notification",
        description: Some(
            "Your ticket **#{ticketName}** in **{server}** will be closed soon if no \
             response has been received.",
        ),
    };
    let description = settings
        .alert_dm_embed
        .resolved_description(&defaults)
        .map(|d| fill(&d, &[("ticketName", ticket_name), ("server", server_name)]));
    let embed = settings.alert_dm_embed.build(&defaults, description);

    let Err(err) = outbound.direct_message(user, CreateMessage::new().embed(embed)).await else {
        return;
    };

    app.reporter
        .report(
            "ERROR",
            &format!(
                "[Alert]: failed to DM {} because their DMs were closed: {err}",
                user.tag()
            ),
        )
        .await;

    if settings.toggle_logs.dm_errors {
        if let Some(log_channel) = settings.logs.dm_errors() {
            let defaults = EmbedDefaults {
                color: RED,
                title: "DMs Disabled",
                description: Some(
                    "The bot could not DM **{user} ({user.tag})** because their DMs were \
                     closed.\nPlease enable `Allow Direct Messages` in this server to receive \
                     further information from the bot!",
                ),
            };
            let description = settings.dm_error_embed.resolved_description(&defaults).map(|d| {
                fill(
                    &d,
                    &[
                        ("user", &format!("<@{}>", user.id)),
                        ("user.tag", &sanitize_input(&user.tag())),
                    ],
                )
            });
            let embed =
                settings.dm_error_embed.build(&defaults, description).timestamp(Timestamp::now());
            let mut notice = CreateMessage::new().embed(embed);
            if settings.dm_error_embed.ping_user.unwrap_or(false) {
                notice = notice.content(format!("<@{}>", user.id));
            }
            if let Err(err) =
                outbound.channel_message(ChannelId::new(log_channel), notice).await
            {
                app.reporter
                    .report(
                        "ERROR",
                        &format!(
                            "[Logging Error]: please make sure to at least configure your \
                             default log channel: {err}"
                        ),
                    )
                    .await;
            }
        }
    }

    app.reporter
        .log_message(&format!(
            "The bot could not DM {} because their DMs were closed",
            user.tag()
        ))
        .await;
}

/// Marks the ticket closed, posts the closure notice, and appends the
/// audit line.
pub async fn auto_close_ticket(
    http: &Http,
    app: &App,
    channel_id: ChannelId,
    notice: &str,
    audit: &str,
) -> Result<(), BotError> {
    app.tickets.set_status(channel_id.get(), TicketStatus::Closed).await?;

    let embed = CreateEmbed::new()
        .title("Ticket Closed")
        .colour(GREEN)
        .description(notice)
        .timestamp(Timestamp::now());
    if let Err(err) =
        channel_id.send_message(http, CreateMessage::new().embed(embed)).await
    {
        app.reporter
            .report("ERROR", &format!("[Auto Close]: failed to send closure notice: {err}"))
            .await;
    }

    app.reporter.log_message(audit).await;
    Ok(())
}

/// Whether a ticket counts as inactive for the auto-close sweep. Channels
/// with no qualifying message fall back to the ticket's creation time, so
/// a freshly opened ticket is never swept straight away.
pub fn is_ticket_inactive(
    last_activity: Option<DateTime<Utc>>,
    creation_time: i64,
    now: DateTime<Utc>,
    window_secs: u64,
) -> bool {
    let last = last_activity.map(|ts| ts.timestamp()).unwrap_or(creation_time);
    now.timestamp() - last >= window_secs as i64
}

/// Closes every open ticket whose newest qualifying message is older than
/// the configured inactivity window. Scan and close failures are reported
/// per ticket and never stop the sweep.
pub async fn close_inactive_tickets(http: &Http, app: &App) {
    let sweep = &app.settings.auto_close_tickets;
    let now = Utc::now();

    for (channel_id, record) in app.tickets.open_tickets().await {
        let pager = ChannelPager::new(http, ChannelId::new(channel_id));
        let last = match history::newest_activity_timestamp(&pager, sweep.ignore_bots).await {
            Ok(last) => last,
            Err(err) => {
                app.reporter
                    .report(
                        "ERROR",
                        &format!("[Auto Close]: failed to scan ticket {channel_id}: {err}"),
                    )
                    .await;
                continue;
            }
        };
        if !is_ticket_inactive(last, record.creation_time, now, sweep.time) {
            continue;
        }

        let window = format_time(sweep.time);
        let notice =
            format!("This ticket was automatically closed after {window} without activity.");
        let audit = format!(
            "The ticket {channel_id} was automatically closed after {window} without activity"
        );
        if let Err(err) =
            auto_close_ticket(http, app, ChannelId::new(channel_id), &notice, &audit).await
        {
            app.reporter
                .report(
                    "ERROR",
                    &format!("[Auto Close]: failed to close ticket {channel_id}: {err}"),
                )
                .await;
        }
    }
}

/// Archives a transcript, deletes the channel, and drops the ticket record.
pub async fn auto_delete_ticket(
    http: &Http,
    app: &App,
    channel_id: ChannelId,
) -> Result<(), BotError> {
    let channel = http.get_channel(channel_id).await?.guild().ok_or(BotError::NotFound {
        entity: "channel",
        id: channel_id.get(),
    })?;

    archive::archive_to_log_channel(http, app, &channel, "Automation").await;

    channel_id.delete(http).await?;
    app.tickets.remove(channel_id.get()).await?;
    app.reporter
        .log_message(&format!(
            "The ticket #{} was automatically deleted after an unanswered alert",
            channel.name
        ))
        .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use chrono::TimeZone;
    use serenity::all::UserId;

    use super::*;
    use crate::report::testing::RecordingReporter;

    #[test]
    fn auto_action_applies_only_on_timeout_with_a_live_ticket() {
        assert_eq!(
            resolve_auto_action(WaitOutcome::TimedOut, true, AutoAction::Delete),
            AutoAction::Delete
        );
        assert_eq!(
            resolve_auto_action(WaitOutcome::TimedOut, true, AutoAction::Close),
            AutoAction::Close
        );
        // Ticket already gone: no-op, no error.
        assert_eq!(
            resolve_auto_action(WaitOutcome::TimedOut, false, AutoAction::Delete),
            AutoAction::None
        );
        // A reply always suppresses the auto action.
        assert_eq!(
            resolve_auto_action(WaitOutcome::Replied(42), true, AutoAction::Delete),
            AutoAction::None
        );
    }

    #[test]
    fn inactivity_window_falls_back_to_the_creation_time() {
        let now = chrono::Utc.timestamp_opt(10_000, 0).unwrap();

        // Recent activity keeps the ticket alive.
        let recent = Some(chrono::Utc.timestamp_opt(9_500, 0).unwrap());
        assert!(!is_ticket_inactive(recent, 0, now, 3_600));

        // Stale activity crosses the window.
        let stale = Some(chrono::Utc.timestamp_opt(6_000, 0).unwrap());
        assert!(is_ticket_inactive(stale, 0, now, 3_600));

        // No qualifying message at all: the creation time decides.
        assert!(!is_ticket_inactive(None, 9_000, now, 3_600));
        assert!(is_ticket_inactive(None, 1_000, now, 3_600));
    }

    struct FakeOutbound {
        dm_attempts: AtomicUsize,
        fail_dm: bool,
        channel_messages: Mutex<Vec<u64>>,
        fail_channel: bool,
    }

    impl FakeOutbound {
        fn new(fail_dm: bool, fail_channel: bool) -> Self {
            Self {
                dm_attempts: AtomicUsize::new(0),
                fail_dm,
                channel_messages: Mutex::new(Vec::new()),
                fail_channel,
            }
        }
    }

    #[async_trait]
    impl Outbound for FakeOutbound {
        async fn direct_message(
            &self,
            _user: &User,
            _message: CreateMessage,
        ) -> Result<(), serenity::Error> {
            self.dm_attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail_dm {
                Err(serenity::Error::Other("cannot send messages to this user"))
            } else {
                Ok(())
            }
        }

        async fn channel_message(
            &self,
            channel_id: ChannelId,
            _message: CreateMessage,
        ) -> Result<(), serenity::Error> {
            self.channel_messages.lock().unwrap().push(channel_id.get());
            if self.fail_channel {
                Err(serenity::Error::Other("unknown channel"))
            } else {
                Ok(())
            }
        }
    }

    async fn app_with(settings: Settings) -> (tempfile::TempDir, App, Arc<RecordingReporter>) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store =
            Arc::new(JsonStore::open(dir.path().join("store.json")).await.expect("open"));
        let reporter = Arc::new(RecordingReporter::default());
        let app = App {
            settings: Arc::new(settings),
            store: store.clone(),
            tickets: Tickets::new(store),
            waits: Arc::new(PendingWaits::new()),
            reporter: reporter.clone(),
        };
        (dir, app, reporter)
    }

    fn dm_enabled_settings(log_channel: Option<u64>) -> Settings {
        let mut settings = Settings::default();
        settings.alert_dm_embed.enabled = Some(true);
        settings.logs.dm_errors = log_channel;
        settings
    }

    fn user(id: u64) -> User {
        let mut user = User::default();
        user.id = UserId::new(id);
        user.name = format!("user{id}");
        user
    }

    #[tokio::test]
    async fn rejected_dm_reports_once_and_posts_the_fallback_notice() {
        let (_dir, app, reporter) = app_with(dm_enabled_settings(Some(555))).await;
        let outbound = FakeOutbound::new(true, false);

        dm_alert(&outbound, &app, &user(7), "ticket-1", "Server").await;

        assert_eq!(outbound.dm_attempts.load(Ordering::SeqCst), 1);
        let reports = reporter.reports.lock().unwrap();
        let dm_failures: Vec<_> =
            reports.iter().filter(|(_, detail)| detail.contains("failed to DM")).collect();
        assert_eq!(dm_failures.len(), 1);
        assert_eq!(*outbound.channel_messages.lock().unwrap(), vec![555]);
        assert!(reporter
            .audit
            .lock()
            .unwrap()
            .iter()
            .any(|line| line.contains("could not DM")));
    }

    #[tokio::test]
    async fn failing_log_channel_adds_a_logging_error_report() {
        let (_dir, app, reporter) = app_with(dm_enabled_settings(Some(555))).await;
        let outbound = FakeOutbound::new(true, true);

        dm_alert(&outbound, &app, &user(7), "ticket-1", "Server").await;

        let reports = reporter.reports.lock().unwrap();
        assert!(reports.iter().any(|(_, d)| d.contains("failed to DM")));
        assert!(reports.iter().any(|(_, d)| d.contains("[Logging Error]")));
    }

    #[tokio::test]
    async fn successful_dm_reports_nothing() {
        let (_dir, app, reporter) = app_with(dm_enabled_settings(Some(555))).await;
        let outbound = FakeOutbound::new(false, false);

        dm_alert(&outbound, &app, &user(7), "ticket-1", "Server").await;

        assert_eq!(outbound.dm_attempts.load(Ordering::SeqCst), 1);
        assert!(reporter.reports.lock().unwrap().is_empty());
        assert!(outbound.channel_messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn opted_out_users_are_never_dmed() {
        let (_dir, app, _reporter) = app_with(dm_enabled_settings(Some(555))).await;
        crate::tickets::set_dm_preference(&app.store, 7, "alert", false).await.unwrap();
        let outbound = FakeOutbound::new(true, false);

        dm_alert(&outbound, &app, &user(7), "ticket-1", "Server").await;

        assert_eq!(outbound.dm_attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn disabled_dm_embed_skips_the_whole_flow() {
        let (_dir, app, _reporter) = app_with(Settings::default()).await;
        let outbound = FakeOutbound::new(true, false);

        dm_alert(&outbound, &app, &user(7), "ticket-1", "Server").await;

        assert_eq!(outbound.dm_attempts.load(Ordering::SeqCst), 0);
    }
}
