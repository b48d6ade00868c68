//! Ticket, blacklist, and preference state over the key-value store.
//!
//! Key shapes: tickets live under their
//! channel id, blacklist entries under `user-{id}` / `role-{id}`, DM
//! preferences under `userPreference-{id}`, and the creator counter under
//! `ticketCreators`. Ids are stored as strings; Discord snowflakes do not
//! survive a trip through JSON numbers.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::BotError;
use crate::store::JsonStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketStatus {
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketRecord {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub ticket_type: String,
    pub status: TicketStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_user: Option<String>,
    /// Unix seconds, rendered as `<t:{}:F>` in embeds.
    pub creation_time: i64,
}

/// Typed view over the ticket portion of the store.
#[derive(Clone)]
pub struct Tickets {
    store: Arc<JsonStore>,
}

impl Tickets {
    pub fn new(store: Arc<JsonStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self, channel_id: u64) -> Option<TicketRecord> {
        let value = self.store.get(&channel_id.to_string()).await?;
        serde_json::from_value(value).ok()
    }

    pub async fn exists(&self, channel_id: u64) -> bool {
        self.store.has(&channel_id.to_string()).await
    }

    pub async fn insert(&self, channel_id: u64, record: &TicketRecord) -> Result<(), BotError> {
        self.store.set(&channel_id.to_string(), serde_json::to_value(record)?).await
    }

    pub async fn set_status(&self, channel_id: u64, status: TicketStatus) -> Result<(), BotError> {
        self.store
            .set(&format!("{channel_id}.status"), serde_json::to_value(status)?)
            .await
    }

    pub async fn remove(&self, channel_id: u64) -> Result<bool, BotError> {
        self.store.delete(&channel_id.to_string()).await
    }

    /// Every open ticket with its channel id, unordered.
    pub async fn open_tickets(&self) -> Vec<(u64, TicketRecord)> {
        let mut open = Vec::new();
        for (key, value) in self.store.all().await {
            let Ok(channel_id) = key.parse::<u64>() else { continue };
            let Ok(record) = serde_json::from_value::<TicketRecord>(value) else { continue };
            if record.status == TicketStatus::Open {
                open.push((channel_id, record));
            }
        }
        open
    }

    /// All tickets belonging to `user_id`, split open/closed, newest first.
    pub async fn for_user(
        &self,
        user_id: u64,
    ) -> (Vec<(u64, TicketRecord)>, Vec<(u64, TicketRecord)>) {
        let user_id = user_id.to_string();
        let mut open = Vec::new();
        let mut closed = Vec::new();
        for (key, value) in self.store.all().await {
            let Ok(channel_id) = key.parse::<u64>() else { continue };
            let Ok(record) = serde_json::from_value::<TicketRecord>(value) else { continue };
            if record.user_id != user_id {
                continue;
            }
            match record.status {
                TicketStatus::Open => open.push((channel_id, record)),
                TicketStatus::Closed => closed.push((channel_id, record)),
            }
        }
        open.sort_by_key(|(_, r)| std::cmp::Reverse(r.creation_time));
        closed.sort_by_key(|(_, r)| std::cmp::Reverse(r.creation_time));
        (open, closed)
    }

    pub async fn first_closed_for_user(&self, user_id: u64) -> Option<u64> {
        let (_, closed) = self.for_user(user_id).await;
        closed.last().map(|(id, _)| *id)
    }

    /// Bumps the per-user created-tickets counter. Read-modify-write with
    /// no cross-await protection, same consistency gap as the source.
    pub async fn add_ticket_creator(&self, user_id: u64) -> Result<(), BotError> {
        let user_id = user_id.to_string();
        let mut creators = match self.store.get("ticketCreators").await {
            Some(Value::Array(entries)) => entries,
            _ => Vec::new(),
        };

        let existing = creators
            .iter_mut()
            .find(|entry| entry.get("userID").and_then(Value::as_str) == Some(&user_id));
        match existing {
            Some(entry) => {
                let count = entry.get("ticketsCreated").and_then(Value::as_u64).unwrap_or(0);
                if let Some(object) = entry.as_object_mut() {
                    object.insert("ticketsCreated".into(), json!(count + 1));
                }
            }
            None => creators.push(json!({ "userID": user_id, "ticketsCreated": 1 })),
        }
        self.store.set("ticketCreators", Value::Array(creators)).await
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlacklistEntry {
    pub reason: String,
    /// Unix milliseconds at the time of blacklisting.
    pub timestamp: i64,
    /// `"30s"`, `"5m"`, `"2h"`, `"7d"`, `"1w"`, or `"permanent"`.
    pub duration: String,
}

/// Parses a duration suffix string to milliseconds. Unknown units and
/// `permanent` yield `None`.
pub fn parse_duration_ms(duration: &str) -> Option<i64> {
    let unit = duration.chars().last()?;
    let value: i64 = duration[..duration.len() - unit.len_utf8()].parse().ok()?;
    let factor = match unit {
        's' => 1_000,
        'm' => 60_000,
        'h' => 3_600_000,
        'd' => 86_400_000,
        'w' => 604_800_000,
        _ => return None,
    };
    Some(value * factor)
}

pub fn is_blacklist_expired(entry: &BlacklistEntry, now_ms: i64) -> bool {
    match parse_duration_ms(&entry.duration) {
        Some(duration_ms) => now_ms >= entry.timestamp + duration_ms,
        // `permanent` or malformed durations never expire.
        None => false,
    }
}

#[derive(Clone)]
pub struct Blacklist {
    store: Arc<JsonStore>,
}

impl Blacklist {
    pub fn new(store: Arc<JsonStore>) -> Self {
        Self { store }
    }

    pub async fn user(&self, user_id: u64) -> Option<BlacklistEntry> {
        let value = self.store.get(&format!("user-{user_id}")).await?;
        serde_json::from_value(value).ok()
    }

    pub async fn role(&self, role_id: u64) -> Option<BlacklistEntry> {
        let value = self.store.get(&format!("role-{role_id}")).await?;
        serde_json::from_value(value).ok()
    }

    pub async fn add_user(&self, user_id: u64, entry: &BlacklistEntry) -> Result<(), BotError> {
        self.store.set(&format!("user-{user_id}"), serde_json::to_value(entry)?).await
    }

    pub async fn add_role(&self, role_id: u64, entry: &BlacklistEntry) -> Result<(), BotError> {
        self.store.set(&format!("role-{role_id}"), serde_json::to_value(entry)?).await
    }

    pub async fn remove_user(&self, user_id: u64) -> Result<bool, BotError> {
        self.store.delete(&format!("user-{user_id}")).await
    }

    pub async fn remove_role(&self, role_id: u64) -> Result<bool, BotError> {
        self.store.delete(&format!("role-{role_id}")).await
    }

    /// Expired user and role ids as of `now_ms`. Permanent entries are
    /// skipped. The caller deletes them and unwinds any blacklist roles.
    pub async fn expired_entries(&self, now_ms: i64) -> (Vec<u64>, Vec<u64>) {
        let mut users = Vec::new();
        let mut roles = Vec::new();
        for (key, value) in self.store.all().await {
            let Ok(entry) = serde_json::from_value::<BlacklistEntry>(value) else { continue };
            if !is_blacklist_expired(&entry, now_ms) {
                continue;
            }
            if let Some(id) = key.strip_prefix("user-").and_then(|s| s.parse().ok()) {
                users.push(id);
            } else if let Some(id) = key.strip_prefix("role-").and_then(|s| s.parse().ok()) {
                roles.push(id);
            }
        }
        (users, roles)
    }
}

/// Whether the user accepts DMs of the given kind (`"alert"`, ...).
/// Missing preference objects and missing kinds fall back to the configured
/// default.
pub async fn dm_preference(store: &JsonStore, user_id: u64, kind: &str, default: bool) -> bool {
    match store.get(&format!("userPreference-{user_id}")).await {
        Some(value) => value.get(kind).and_then(Value::as_bool).unwrap_or(default),
        None => default,
    }
}

pub async fn set_dm_preference(
    store: &JsonStore,
    user_id: u64,
    kind: &str,
    allowed: bool,
) -> Result<(), BotError> {
    store.set(&format!("userPreference-{user_id}.{kind}"), json!(allowed)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn fixtures() -> (tempfile::TempDir, Arc<JsonStore>) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonStore::open(dir.path().join("store.json")).await.expect("open");
        (dir, Arc::new(store))
    }

    fn open_ticket(user_id: u64, creation_time: i64) -> TicketRecord {
        TicketRecord {
            user_id: user_id.to_string(),
            ticket_type: "support".into(),
            status: TicketStatus::Open,
            claim_user: None,
            creation_time,
        }
    }

    #[tokio::test]
    async fn ticket_roundtrip_and_status_change() {
        let (_dir, store) = fixtures().await;
        let tickets = Tickets::new(store);
        tickets.insert(100, &open_ticket(7, 1_700_000_000)).await.unwrap();

        assert!(tickets.exists(100).await);
        tickets.set_status(100, TicketStatus::Closed).await.unwrap();
        assert_eq!(tickets.get(100).await.unwrap().status, TicketStatus::Closed);

        assert!(tickets.remove(100).await.unwrap());
        assert!(!tickets.exists(100).await);
    }

    #[tokio::test]
    async fn for_user_splits_and_sorts_newest_first() {
        let (_dir, store) = fixtures().await;
        let tickets = Tickets::new(store);
        tickets.insert(1, &open_ticket(7, 10)).await.unwrap();
        tickets.insert(2, &open_ticket(7, 30)).await.unwrap();
        let mut closed = open_ticket(7, 20);
        closed.status = TicketStatus::Closed;
        tickets.insert(3, &closed).await.unwrap();
        tickets.insert(4, &open_ticket(8, 40)).await.unwrap();

        let (open, closed) = tickets.for_user(7).await;
        assert_eq!(open.iter().map(|(id, _)| *id).collect::<Vec<_>>(), vec![2, 1]);
        assert_eq!(closed.len(), 1);
        assert_eq!(tickets.first_closed_for_user(7).await, Some(3));
        assert_eq!(tickets.first_closed_for_user(8).await, None);
    }

    #[tokio::test]
    async fn open_tickets_skips_closed_and_non_ticket_keys() {
        let (_dir, store) = fixtures().await;
        let tickets = Tickets::new(store.clone());
        tickets.insert(1, &open_ticket(7, 10)).await.unwrap();
        let mut closed = open_ticket(7, 20);
        closed.status = TicketStatus::Closed;
        tickets.insert(2, &closed).await.unwrap();
        store.set("user-9", serde_json::json!({"reason": "spam"})).await.unwrap();

        let open = tickets.open_tickets().await;
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].0, 1);
    }

    #[tokio::test]
    async fn creator_counter_increments_per_user() {
        let (_dir, store) = fixtures().await;
        let tickets = Tickets::new(store.clone());
        tickets.add_ticket_creator(7).await.unwrap();
        tickets.add_ticket_creator(7).await.unwrap();
        tickets.add_ticket_creator(8).await.unwrap();

        let creators = store.get("ticketCreators").await.unwrap();
        let creators = creators.as_array().unwrap();
        assert_eq!(creators.len(), 2);
        assert_eq!(creators[0]["ticketsCreated"], 2);
        assert_eq!(creators[1]["ticketsCreated"], 1);
    }

    #[test]
    fn duration_parsing_covers_all_units() {
        assert_eq!(parse_duration_ms("30s"), Some(30_000));
        assert_eq!(parse_duration_ms("5m"), Some(300_000));
        assert_eq!(parse_duration_ms("2h"), Some(7_200_000));
        assert_eq!(parse_duration_ms("1d"), Some(86_400_000));
        assert_eq!(parse_duration_ms("1w"), Some(604_800_000));
        assert_eq!(parse_duration_ms("permanent"), None);
        assert_eq!(parse_duration_ms(""), None);
    }

    #[test]
    fn permanent_blacklists_never_expire() {
        let entry = BlacklistEntry {
            reason: "spam".into(),
            timestamp: 0,
            duration: "permanent".into(),
        };
        assert!(!is_blacklist_expired(&entry, i64::MAX));
    }

    #[test]
    fn timed_blacklists_expire_at_the_boundary() {
        let entry =
            BlacklistEntry { reason: "spam".into(), timestamp: 1_000, duration: "30s".into() };
        assert!(!is_blacklist_expired(&entry, 30_999));
        assert!(is_blacklist_expired(&entry, 31_000));
    }

    #[tokio::test]
    async fn expired_entries_split_users_and_roles() {
        let (_dir, store) = fixtures().await;
        let blacklist = Blacklist::new(store);
        let expired =
            BlacklistEntry { reason: "r".into(), timestamp: 0, duration: "1s".into() };
        let permanent =
            BlacklistEntry { reason: "r".into(), timestamp: 0, duration: "permanent".into() };

        blacklist.add_user(1, &expired).await.unwrap();
        blacklist.add_user(2, &permanent).await.unwrap();
        blacklist.add_role(3, &expired).await.unwrap();

        let (users, roles) = blacklist.expired_entries(10_000).await;
        assert_eq!(users, vec![1]);
        assert_eq!(roles, vec![3]);
    }

    #[tokio::test]
    async fn dm_preference_defaults_until_set() {
        let (_dir, store) = fixtures().await;
        assert!(dm_preference(&store, 7, "alert", true).await);
        assert!(!dm_preference(&store, 7, "alert", false).await);

        set_dm_preference(&store, 7, "alert", false).await.unwrap();
        assert!(!dm_preference(&store, 7, "alert", true).await);
        // Other kinds still fall back to the default.
        assert!(dm_preference(&store, 7, "close", true).await);
    }
}
