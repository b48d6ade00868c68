//! Flat-text transcript rendering for archived tickets.
//!
//! Messages arrive from the history reader in fetch order (newest first);
//! the serializer reverses them exactly once so the artifact reads
//! chronologically. Output is deterministic: the only timestamps in it are
//! the ones carried by the messages themselves.

use chrono::{DateTime, Utc};

use crate::template;

/// Immutable snapshot of one channel message, detached from the platform.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRecord {
    pub id: u64,
    pub author_id: u64,
    pub author_name: String,
    pub author_is_bot: bool,
    pub created_at: DateTime<Utc>,
    pub content: String,
    pub attachment_urls: Vec<String>,
    pub embeds: Vec<EmbedSummary>,
}

/// Flattened view of a rich embed, just enough for text rendering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbedSummary {
    pub title: Option<String>,
    pub description: Option<String>,
    pub fields: Vec<(String, String)>,
}

/// Context lines rendered into the transcript header.
#[derive(Debug, Clone)]
pub struct TranscriptContext {
    pub server_name: String,
    pub channel_name: String,
    pub category: String,
    pub creator_tag: String,
    pub deleted_by_tag: String,
    pub claimed_by_tag: Option<String>,
}

/// One archival rendering of a ticket channel. Immutable once built.
#[derive(Debug, Clone)]
pub struct TranscriptArtifact {
    pub file_name: String,
    pub header: String,
    pub lines: Vec<String>,
    pub total_messages: usize,
}

impl TranscriptArtifact {
    /// The full flat-text document, ready to attach to a message.
    pub fn into_bytes(self) -> Vec<u8> {
        let mut parts = Vec::with_capacity(self.lines.len() + 2);
        parts.push(self.header);
        parts.extend(self.lines);
        parts.push(format!("\nTotal messages: {}", self.total_messages));
        parts.join("\n").into_bytes()
    }
}

/// Builds the flat transcript from messages in fetch order (newest first).
pub fn serialize(
    messages: &[MessageRecord],
    context: &TranscriptContext,
    file_name: String,
) -> TranscriptArtifact {
    let mut lines: Vec<String> = messages.iter().map(render_line).collect();
    lines.reverse();

    let header = format!(
        "Server: {}\nTicket: #{}\nCategory: {}\nTicket Author: {}\nDeleted By: {}\nClaimed By: {}\n",
        context.server_name,
        context.channel_name,
        context.category,
        context.creator_tag,
        context.deleted_by_tag,
        context.claimed_by_tag.as_deref().unwrap_or("None"),
    );

    TranscriptArtifact { file_name, header, lines, total_messages: messages.len() }
}

/// Resolves the transcript file name from the operator-configured template.
/// Supported placeholders: `{channelName}`, `{username}`, `{displayName}`.
pub fn resolve_file_name(
    template: &str,
    channel_name: &str,
    username: Option<&str>,
    display_name: Option<&str>,
) -> String {
    let mut name = template.replace("{channelName}", channel_name);
    if let Some(username) = username {
        name = template::fill(
            &name,
            &[
                ("username", username),
                ("displayName", display_name.unwrap_or(username)),
            ],
        );
    }
    format!("{name}.txt")
}

fn render_line(message: &MessageRecord) -> String {
    // Same visual shape as JS `toLocaleString()`, pinned to UTC so the
    // output never depends on host locale.
    let timestamp = message.created_at.format("%-m/%-d/%Y, %-I:%M:%S %p");
    let mut line = format!("[{timestamp}] {}: ", message.author_name);

    if !message.content.is_empty() {
        line.push_str(&message.content);
        if !message.attachment_urls.is_empty() {
            line.push(' ');
        }
    }

    if !message.attachment_urls.is_empty() {
        line.push_str(&message.attachment_urls.join("\n"));
    }

    let embed_text: Vec<String> = message
        .embeds
        .iter()
        .map(render_embed)
        .filter(|text| !text.is_empty())
        .collect();
    if !embed_text.is_empty() {
        line.push_str(&embed_text.join("\n"));
    }

    line
}

fn render_embed(embed: &EmbedSummary) -> String {
    let mut out = String::new();
    if let Some(title) = &embed.title {
        out.push_str(&format!("Embed Title: {title}\n"));
    }
    if let Some(description) = &embed.description {
        out.push_str(&format!("Embed Description: {description}\n"));
    }
    if !embed.fields.is_empty() {
        let fields: Vec<String> = embed
            .fields
            .iter()
            .map(|(name, value)| format!("{name} : {value}"))
            .collect();
        out.push_str(&fields.join("\n"));
        out.push('\n');
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn record(id: u64, content: &str) -> MessageRecord {
        MessageRecord {
            id,
            author_id: 10,
            author_name: "helper".into(),
            author_is_bot: false,
            created_at: Utc.with_ymd_and_hms(2024, 6, 17, 15, 45, 12).unwrap(),
            content: content.into(),
            attachment_urls: Vec::new(),
            embeds: Vec::new(),
        }
    }

    fn context() -> TranscriptContext {
        TranscriptContext {
            server_name: "Support Server".into(),
            channel_name: "ticket-0007".into(),
            category: "support".into(),
            creator_tag: "creator#0".into(),
            deleted_by_tag: "staff#0".into(),
            claimed_by_tag: None,
        }
    }

    #[test]
    fn lines_are_reversed_into_chronological_order() {
        // Fetch order is newest first.
        let messages = vec![record(3, "third"), record(2, "second"), record(1, "first")];
        let artifact = serialize(&messages, &context(), "t".into());

        assert_eq!(artifact.total_messages, 3);
        assert!(artifact.lines[0].ends_with("helper: first"));
        assert!(artifact.lines[2].ends_with("helper: third"));
    }

    #[test]
    fn header_and_footer_surround_the_lines() {
        let artifact = serialize(&[record(1, "hello")], &context(), "t".into());
        let text = String::from_utf8(artifact.into_bytes()).unwrap();

        assert!(text.starts_with(
            "Server: Support Server\nTicket: #ticket-0007\nCategory: support\n\
             Ticket Author: creator#0\nDeleted By: staff#0\nClaimed By: None\n"
        ));
        assert!(text.ends_with("\nTotal messages: 1"));
    }

    #[test]
    fn empty_channel_still_renders_header_and_zero_footer() {
        let artifact = serialize(&[], &context(), "t".into());
        let text = String::from_utf8(artifact.into_bytes()).unwrap();
        assert!(text.ends_with("\nTotal messages: 0"));
    }

    #[test]
    fn output_is_deterministic() {
        let messages = vec![record(2, "b"), record(1, "a")];
        let first = serialize(&messages, &context(), "t".into()).into_bytes();
        let second = serialize(&messages, &context(), "t".into()).into_bytes();
        assert_eq!(first, second);
    }

    #[test]
    fn embed_title_and_description_render_as_labelled_lines() {
        let mut message = record(1, "");
        message.embeds.push(EmbedSummary {
            title: Some("Note".into()),
            description: Some("Hello".into()),
            fields: Vec::new(),
        });
        let artifact = serialize(&[message], &context(), "t".into());
        assert!(artifact.lines[0].contains("Embed Title: Note\nEmbed Description: Hello"));
    }

    #[test]
    fn embed_fields_render_name_colon_value() {
        let mut message = record(1, "");
        message.embeds.push(EmbedSummary {
            title: None,
            description: None,
            fields: vec![("Status".into(), "Open".into()), ("Tier".into(), "1".into())],
        });
        let artifact = serialize(&[message], &context(), "t".into());
        assert!(artifact.lines[0].contains("Status : Open\nTier : 1"));
    }

    #[test]
    fn attachments_follow_content_separated_by_a_space() {
        let mut message = record(1, "see this");
        message.attachment_urls =
            vec!["https://cdn.test/a.png".into(), "https://cdn.test/b.png".into()];
        let artifact = serialize(&[message], &context(), "t".into());
        assert!(artifact.lines[0]
            .ends_with("see this https://cdn.test/a.png\nhttps://cdn.test/b.png"));
    }

    #[test]
    fn timestamp_uses_the_locale_style_format() {
        let artifact = serialize(&[record(1, "x")], &context(), "t".into());
        assert!(artifact.lines[0].starts_with("[6/17/2024, 3:45:12 PM] helper: x"));
    }

    #[test]
    fn file_name_template_substitution() {
        let name = resolve_file_name(
            "{channelName}-by-{username}",
            "ticket-0007",
            Some("alice"),
            Some("Alice W"),
        );
        assert_eq!(name, "ticket-0007-by-alice.txt");

        let name = resolve_file_name("{channelName}-transcript", "ticket-1", None, None);
        assert_eq!(name, "ticket-1-transcript.txt");

        // displayName falls back to the username when no member was found.
        let name = resolve_file_name("{displayName}", "c", Some("bob"), None);
        assert_eq!(name, "bob.txt");
    }
}
