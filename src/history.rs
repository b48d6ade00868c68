//! Backward-paginated channel history retrieval.
//!
//! Discord caps history reads at 100 messages per request, newest first.
//! Every operation here walks pages strictly sequentially, each request
//! keyed `before` the oldest id seen so far, until a short page signals
//! exhaustion or an early-stop predicate matches.
//!
//! The early-stop scans match in fetch order, i.e. they find the *newest*
//! qualifying message. Their names say so; a caller that needs the oldest
//! match must `fetch_all` and scan the result instead.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::all::{ChannelId, GetMessages, MessageId};
use serenity::http::Http;

use crate::errors::BotError;
use crate::transcript::{EmbedSummary, MessageRecord};

/// Platform-imposed page size.
pub const PAGE_SIZE: usize = 100;

/// One page of a channel's history. The seam exists so the pagination loop
/// is testable without a gateway connection.
#[async_trait]
pub trait MessagePager: Send + Sync {
    /// Fetches up to `limit` messages strictly older than `before`
    /// (or the newest messages when `before` is `None`), newest first.
    async fn page(&self, limit: u8, before: Option<u64>) -> Result<Vec<MessageRecord>, BotError>;
}

/// Fetches the channel's entire history, newest first.
pub async fn fetch_all(pager: &dyn MessagePager) -> Result<Vec<MessageRecord>, BotError> {
    let mut messages = Vec::new();
    let mut before = None;

    loop {
        let page = pager.page(PAGE_SIZE as u8, before).await?;
        let fetched = page.len();
        before = page.last().map(|m| m.id);
        messages.extend(page);
        if fetched < PAGE_SIZE {
            break;
        }
    }
    Ok(messages)
}

/// Counts messages without keeping their bodies around.
pub async fn count_messages(pager: &dyn MessagePager) -> Result<usize, BotError> {
    let mut count = 0;
    let mut before = None;

    loop {
        let page = pager.page(PAGE_SIZE as u8, before).await?;
        count += page.len();
        before = page.last().map(|m| m.id);
        if page.len() < PAGE_SIZE {
            break;
        }
    }
    Ok(count)
}

/// Timestamp of the newest message matching `predicate`, stopping at the
/// first match in fetch order.
pub async fn newest_matching_timestamp(
    pager: &dyn MessagePager,
    predicate: impl Fn(&MessageRecord) -> bool + Send,
) -> Result<Option<DateTime<Utc>>, BotError> {
    let mut before = None;

    loop {
        let page = pager.page(PAGE_SIZE as u8, before).await?;
        if let Some(message) = page.iter().find(|m| predicate(m)) {
            return Ok(Some(message.created_at));
        }
        before = page.last().map(|m| m.id);
        if page.len() < PAGE_SIZE {
            return Ok(None);
        }
    }
}

/// Newest message timestamp from the given author.
pub async fn newest_author_timestamp(
    pager: &dyn MessagePager,
    author_id: u64,
) -> Result<Option<DateTime<Utc>>, BotError> {
    newest_matching_timestamp(pager, |m| m.author_id == author_id).await
}

/// Newest activity in the channel, optionally skipping bot messages.
pub async fn newest_activity_timestamp(
    pager: &dyn MessagePager,
    ignore_bots: bool,
) -> Result<Option<DateTime<Utc>>, BotError> {
    newest_matching_timestamp(pager, |m| !(ignore_bots && m.author_is_bot)).await
}

/// Live pager over a channel's REST history endpoint.
pub struct ChannelPager<'a> {
    http: &'a Http,
    channel_id: ChannelId,
}

impl<'a> ChannelPager<'a> {
    pub fn new(http: &'a Http, channel_id: ChannelId) -> Self {
        Self { http, channel_id }
    }
}

#[async_trait]
impl MessagePager for ChannelPager<'_> {
    async fn page(&self, limit: u8, before: Option<u64>) -> Result<Vec<MessageRecord>, BotError> {
        let mut request = GetMessages::new().limit(limit);
        if let Some(before) = before {
            request = request.before(MessageId::new(before));
        }
        let messages = self.channel_id.messages(self.http, request).await?;
        Ok(messages.iter().map(record_from_message).collect())
    }
}

pub fn record_from_message(message: &serenity::all::Message) -> MessageRecord {
    MessageRecord {
        id: message.id.get(),
        author_id: message.author.id.get(),
        author_name: message.author.name.clone(),
        author_is_bot: message.author.bot,
        created_at: DateTime::from_timestamp(message.timestamp.unix_timestamp(), 0)
            .unwrap_or_default(),
        content: message.content.clone(),
        attachment_urls: message.attachments.iter().map(|a| a.proxy_url.clone()).collect(),
        embeds: message
            .embeds
            .iter()
            .map(|embed| EmbedSummary {
                title: embed.title.clone(),
                description: embed.description.clone(),
                fields: embed
                    .fields
                    .iter()
                    .map(|field| (field.name.clone(), field.value.clone()))
                    .collect(),
            })
            .collect(),
    }
}
