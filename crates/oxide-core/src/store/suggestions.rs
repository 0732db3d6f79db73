use std::{collections::HashMap, fmt, str::FromStr, sync::Arc};

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    domain::{ChannelId, ChatId, GuildId, MessageId, MessageRef, SequenceId, UserId},
    errors::Error,
    Result,
};

use super::is_unique_violation;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SuggestionStatus {
    Pending,
    Accepted,
    Declined,
    Considered,
}

impl SuggestionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SuggestionStatus::Pending => "pending",
            SuggestionStatus::Accepted => "accepted",
            SuggestionStatus::Declined => "declined",
            SuggestionStatus::Considered => "considered",
        }
    }

    pub fn is_terminal(self) -> bool {
        self != SuggestionStatus::Pending
    }
}

impl fmt::Display for SuggestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SuggestionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(SuggestionStatus::Pending),
            "accepted" => Ok(SuggestionStatus::Accepted),
            "declined" => Ok(SuggestionStatus::Declined),
            "considered" => Ok(SuggestionStatus::Considered),
            other => Err(Error::InvariantViolation(format!(
                "unknown suggestion status in store: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Suggestion {
    pub guild_id: GuildId,
    pub sequence_id: SequenceId,
    pub channel_id: ChannelId,
    pub author_id: UserId,
    pub message: MessageRef,
    pub content: Option<String>,
    pub attachment_url: Option<String>,
    pub anonymous: bool,
    pub status: SuggestionStatus,
    pub edited_at: DateTime<Utc>,
    pub action_updated_at: Option<DateTime<Utc>>,
    pub action_note: Option<String>,
}

/// Everything a fresh suggestion needs besides its sequence id.
#[derive(Clone, Debug)]
pub struct NewSuggestion {
    pub channel_id: ChannelId,
    pub author_id: UserId,
    pub message: MessageRef,
    pub content: Option<String>,
    pub attachment_url: Option<String>,
    pub anonymous: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct SuggestionRow {
    id: i64,
    guild_id: i64,
    channel_id: i64,
    author_id: i64,
    message_id: i32,
    content: Option<String>,
    attachment_url: Option<String>,
    anonymous: bool,
    status: String,
    edited_at: String,
    action_updated_at: Option<String>,
    action_note: Option<String>,
}

impl TryFrom<SuggestionRow> for Suggestion {
    type Error = Error;

    fn try_from(r: SuggestionRow) -> Result<Self> {
        Ok(Self {
            guild_id: GuildId(r.guild_id),
            sequence_id: r.id,
            channel_id: ChannelId(r.channel_id),
            author_id: UserId(r.author_id),
            message: MessageRef {
                chat_id: ChatId(r.channel_id),
                message_id: MessageId(r.message_id),
            },
            content: r.content,
            attachment_url: r.attachment_url,
            anonymous: r.anonymous,
            status: r.status.parse()?,
            edited_at: parse_ts(&r.edited_at)?,
            action_updated_at: r.action_updated_at.as_deref().map(parse_ts).transpose()?,
            action_note: r.action_note,
        })
    }
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::InvariantViolation(format!("bad timestamp in store: {s}: {e}")))
}

/// One writer per guild for sequence id assignment.
#[derive(Default)]
struct GuildLocks {
    inner: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl GuildLocks {
    async fn lock_guild(&self, guild_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            // Held or awaited locks have clones outside the map; the rest are idle.
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            map.entry(guild_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.inner.lock().await.len()
    }
}

/// A sequence id held for one pending insert.
///
/// Other posts in the same guild wait in [`SuggestionStore::reserve`] until this
/// reservation is consumed by [`SuggestionStore::insert`] or dropped.
pub struct SequenceReservation {
    guild_id: GuildId,
    sequence_id: SequenceId,
    _guard: OwnedMutexGuard<()>,
}

impl SequenceReservation {
    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn sequence_id(&self) -> SequenceId {
        self.sequence_id
    }
}

const SELECT_SUGGESTION: &str = r#"SELECT id, guild_id, channel_id, author_id, message_id, content,
        attachment_url, anonymous, status, edited_at, action_updated_at, action_note
    FROM store WHERE guild_id = ? AND id = ?"#;

/// SQLite-backed suggestion records.
#[derive(Clone)]
pub struct SuggestionStore {
    pool: SqlitePool,
    locks: Arc<GuildLocks>,
}

impl SuggestionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            locks: Arc::new(GuildLocks::default()),
        }
    }

    /// `count(existing suggestions for guild) + 1`. Use [`Self::reserve`] to actually claim it.
    pub async fn next_sequence_id(&self, guild: GuildId) -> Result<SequenceId> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM store WHERE guild_id = ?")
            .bind(guild.0)
            .fetch_one(&self.pool)
            .await?;
        Ok(count + 1)
    }

    /// Claim the next sequence id of `guild`, blocking other claims for the guild
    /// until the reservation is inserted or dropped.
    pub async fn reserve(&self, guild: GuildId) -> Result<SequenceReservation> {
        let guard = self.locks.lock_guild(guild.0).await;
        let sequence_id = self.next_sequence_id(guild).await?;
        Ok(SequenceReservation {
            guild_id: guild,
            sequence_id,
            _guard: guard,
        })
    }

    pub async fn insert(
        &self,
        reservation: SequenceReservation,
        new: NewSuggestion,
    ) -> Result<Suggestion> {
        let guild = reservation.guild_id;
        let id = reservation.sequence_id;

        let res = sqlx::query(
            r#"INSERT INTO store (id, guild_id, channel_id, author_id, message_id, content,
                                  attachment_url, anonymous, status, edited_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(id)
        .bind(guild.0)
        .bind(new.channel_id.0)
        .bind(new.author_id.0)
        .bind(new.message.message_id.0)
        .bind(new.content.as_deref())
        .bind(new.attachment_url.as_deref())
        .bind(new.anonymous)
        .bind(SuggestionStatus::Pending.as_str())
        .bind(new.created_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(Error::InvariantViolation(format!(
                    "duplicate suggestion id {id} in guild {guild}"
                )))
            }
            Err(e) => return Err(e.into()),
        }
        drop(reservation);

        self.get(guild, id).await?.ok_or_else(|| {
            Error::InvariantViolation(format!("suggestion {id} vanished after insert"))
        })
    }

    pub async fn get(&self, guild: GuildId, id: SequenceId) -> Result<Option<Suggestion>> {
        let row = sqlx::query_as::<_, SuggestionRow>(SELECT_SUGGESTION)
            .bind(guild.0)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    /// Move a pending suggestion to a terminal status.
    ///
    /// The update is a single compare-and-set on `status = 'pending'`, so two racing
    /// moderators can never both succeed.
    pub async fn transition(
        &self,
        guild: GuildId,
        id: SequenceId,
        status: SuggestionStatus,
        note: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Suggestion> {
        if !status.is_terminal() {
            return Err(Error::InvariantViolation(format!(
                "suggestion {id} cannot transition to {status}"
            )));
        }

        let res = sqlx::query(
            r#"UPDATE store SET status = ?, action_note = ?, action_updated_at = ?
               WHERE guild_id = ? AND id = ? AND status = 'pending'"#,
        )
        .bind(status.as_str())
        .bind(note)
        .bind(at.to_rfc3339())
        .bind(guild.0)
        .bind(id)
        .execute(&self.pool)
        .await?;

        let current = self.get(guild, id).await?.ok_or(Error::NotFound(id))?;
        if res.rows_affected() == 0 {
            return Err(Error::AlreadyResolved {
                sequence_id: id,
                status: current.status,
            });
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Database;

    async fn store() -> (Database, SuggestionStore) {
        let db = Database::open_in_memory().await.unwrap();
        let store = db.stores().suggestions;
        (db, store)
    }

    fn new_suggestion(channel: i64, author: i64, message_id: i32) -> NewSuggestion {
        NewSuggestion {
            channel_id: ChannelId(channel),
            author_id: UserId(author),
            message: MessageRef {
                chat_id: ChatId(channel),
                message_id: MessageId(message_id),
            },
            content: Some("more cats".to_string()),
            attachment_url: None,
            anonymous: false,
            created_at: Utc::now(),
        }
    }

    async fn row_count(db: &Database) -> i64 {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM store")
            .fetch_one(db.pool())
            .await
            .unwrap();
        n
    }

    #[tokio::test]
    async fn sequence_ids_are_per_guild() {
        let (_db, store) = store().await;
        assert_eq!(store.next_sequence_id(GuildId(1)).await.unwrap(), 1);

        let r = store.reserve(GuildId(1)).await.unwrap();
        let s = store.insert(r, new_suggestion(10, 5, 100)).await.unwrap();
        assert_eq!(s.sequence_id, 1);
        assert_eq!(s.status, SuggestionStatus::Pending);
        assert_eq!(s.content.as_deref(), Some("more cats"));

        let r = store.reserve(GuildId(2)).await.unwrap();
        assert_eq!(r.sequence_id(), 1);
        drop(r);

        let r = store.reserve(GuildId(1)).await.unwrap();
        assert_eq!(r.sequence_id(), 2);
    }

    #[tokio::test]
    async fn concurrent_reservations_never_share_an_id() {
        let (db, store) = store().await;

        let mut handles = Vec::new();
        for i in 0..12 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let r = store.reserve(GuildId(1)).await.unwrap();
                tokio::task::yield_now().await;
                store
                    .insert(r, new_suggestion(10 + (i % 3), i, 100 + i as i32))
                    .await
                    .unwrap()
                    .sequence_id
            }));
        }

        let mut ids = Vec::new();
        for h in handles {
            ids.push(h.await.unwrap());
        }
        ids.sort_unstable();
        assert_eq!(ids, (1..=12).collect::<Vec<_>>());
        assert_eq!(row_count(&db).await, 12);
        assert_eq!(store.next_sequence_id(GuildId(1)).await.unwrap(), 13);
    }

    #[tokio::test]
    async fn dropped_reservation_leaves_no_gap() {
        let (_db, store) = store().await;
        let r = store.reserve(GuildId(1)).await.unwrap();
        assert_eq!(r.sequence_id(), 1);
        drop(r);

        let r = store.reserve(GuildId(1)).await.unwrap();
        let s = store.insert(r, new_suggestion(10, 5, 100)).await.unwrap();
        assert_eq!(s.sequence_id, 1);
    }

    #[tokio::test]
    async fn idle_guild_locks_are_released() {
        let (_db, store) = store().await;
        let held = store.reserve(GuildId(1)).await.unwrap();
        drop(store.reserve(GuildId(2)).await.unwrap());
        assert_eq!(store.locks.tracked().await, 2);

        // Guild 2 is idle by now; guild 1 still holds its reservation.
        drop(store.reserve(GuildId(3)).await.unwrap());
        assert_eq!(store.locks.tracked().await, 2);

        drop(held);
        drop(store.reserve(GuildId(3)).await.unwrap());
        assert_eq!(store.locks.tracked().await, 1);
    }

    #[tokio::test]
    async fn transition_is_one_way() {
        let (_db, store) = store().await;
        let r = store.reserve(GuildId(1)).await.unwrap();
        store.insert(r, new_suggestion(10, 5, 100)).await.unwrap();

        let at = Utc::now();
        let s = store
            .transition(GuildId(1), 1, SuggestionStatus::Accepted, Some("great"), at)
            .await
            .unwrap();
        assert_eq!(s.status, SuggestionStatus::Accepted);
        assert_eq!(s.action_note.as_deref(), Some("great"));
        assert!(s.action_updated_at.is_some());

        for next in [
            SuggestionStatus::Accepted,
            SuggestionStatus::Declined,
            SuggestionStatus::Considered,
        ] {
            let err = store
                .transition(GuildId(1), 1, next, None, Utc::now())
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                Error::AlreadyResolved {
                    sequence_id: 1,
                    status: SuggestionStatus::Accepted
                }
            ));
        }

        let s = store.get(GuildId(1), 1).await.unwrap().unwrap();
        assert_eq!(s.action_note.as_deref(), Some("great"));
    }

    #[tokio::test]
    async fn transition_of_missing_suggestion_is_not_found() {
        let (db, store) = store().await;
        let err = store
            .transition(GuildId(1), 42, SuggestionStatus::Declined, None, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(42)));
        assert_eq!(row_count(&db).await, 0);
    }

    #[tokio::test]
    async fn transition_back_to_pending_is_an_invariant_violation() {
        let (_db, store) = store().await;
        let r = store.reserve(GuildId(1)).await.unwrap();
        store.insert(r, new_suggestion(10, 5, 100)).await.unwrap();

        let err = store
            .transition(GuildId(1), 1, SuggestionStatus::Pending, None, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
    }

    #[tokio::test]
    async fn duplicate_primary_key_is_rejected() {
        let (db, store) = store().await;
        let r = store.reserve(GuildId(1)).await.unwrap();
        store.insert(r, new_suggestion(10, 5, 100)).await.unwrap();

        // A writer that bypassed the guild lock.
        let stale = SequenceReservation {
            guild_id: GuildId(1),
            sequence_id: 1,
            _guard: Arc::new(Mutex::new(())).lock_owned().await,
        };
        let err = store
            .insert(stale, new_suggestion(10, 6, 101))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
        assert_eq!(row_count(&db).await, 1);
    }
}
