use sqlx::SqlitePool;

use crate::{
    domain::{ChannelId, GuildId, UserId},
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlacklistEntry {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub user_id: UserId,
    pub reason: Option<String>,
}

#[derive(sqlx::FromRow)]
struct BlacklistRow {
    guild_id: i64,
    channel_id: i64,
    user_id: i64,
    reason: Option<String>,
}

impl From<BlacklistRow> for BlacklistEntry {
    fn from(r: BlacklistRow) -> Self {
        Self {
            guild_id: GuildId(r.guild_id),
            channel_id: ChannelId(r.channel_id),
            user_id: UserId(r.user_id),
            reason: r.reason,
        }
    }
}

/// SQLite-backed per-channel posting bans.
#[derive(Clone)]
pub struct BlacklistStore {
    pool: SqlitePool,
}

impl BlacklistStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a ban, or update an existing one.
    ///
    /// A blank or missing `reason` keeps whatever reason was stored before.
    pub async fn upsert(
        &self,
        guild: GuildId,
        channel: ChannelId,
        user: UserId,
        reason: Option<&str>,
    ) -> Result<BlacklistEntry> {
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        sqlx::query(
            r#"INSERT INTO blacklist (guild_id, channel_id, user_id, reason)
               VALUES (?, ?, ?, ?)
               ON CONFLICT(channel_id, user_id) DO UPDATE SET
                 reason = COALESCE(excluded.reason, blacklist.reason)"#,
        )
        .bind(guild.0)
        .bind(channel.0)
        .bind(user.0)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(self
            .check(channel, user)
            .await?
            .unwrap_or(BlacklistEntry {
                guild_id: guild,
                channel_id: channel,
                user_id: user,
                reason: reason.map(str::to_string),
            }))
    }

    /// Returns whether an entry existed.
    pub async fn remove(&self, channel: ChannelId, user: UserId) -> Result<bool> {
        let res = sqlx::query("DELETE FROM blacklist WHERE channel_id = ? AND user_id = ?")
            .bind(channel.0)
            .bind(user.0)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Admission check before posting.
    pub async fn check(&self, channel: ChannelId, user: UserId) -> Result<Option<BlacklistEntry>> {
        let row = sqlx::query_as::<_, BlacklistRow>(
            "SELECT guild_id, channel_id, user_id, reason FROM blacklist WHERE channel_id = ? AND user_id = ?",
        )
        .bind(channel.0)
        .bind(user.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }
}
