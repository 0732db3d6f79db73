use std::{fmt, str::FromStr};

use sqlx::SqlitePool;

use crate::{
    domain::{ChannelId, GuildId, RoleId},
    errors::Error,
    Result,
};

use super::is_unique_violation;

/// Toggleable per-channel settings, in menu order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SettingKey {
    AllowAnonymous,
    ActionNotificationEnabled,
    AllowAttachments,
    AllowEdits,
    Enabled,
}

#[derive(Clone, Copy, Debug)]
pub struct SettingDescriptor {
    pub key: SettingKey,
    /// Stable name, also the column name.
    pub name: &'static str,
    pub label: &'static str,
    pub enable_text: &'static str,
    pub disable_text: &'static str,
}

pub const SETTINGS: [SettingDescriptor; 5] = [
    SettingDescriptor {
        key: SettingKey::AllowAnonymous,
        name: "allow_anonymous",
        label: "Anonymous suggestions",
        enable_text: "Allow anonymous suggestions",
        disable_text: "Disallow anonymous suggestions",
    },
    SettingDescriptor {
        key: SettingKey::ActionNotificationEnabled,
        name: "action_notification_enabled",
        label: "Action notifications",
        enable_text: "Notify authors when their suggestion is actioned",
        disable_text: "Don't notify authors",
    },
    SettingDescriptor {
        key: SettingKey::AllowAttachments,
        name: "allow_attachments",
        label: "Attachments",
        enable_text: "Allow attachments",
        disable_text: "Disallow attachments",
    },
    SettingDescriptor {
        key: SettingKey::AllowEdits,
        name: "allow_edits",
        label: "Suggestion edits",
        enable_text: "Allow authors to edit suggestions",
        disable_text: "Disallow edits",
    },
    SettingDescriptor {
        key: SettingKey::Enabled,
        name: "enabled",
        label: "Suggestions enabled",
        enable_text: "Enable suggestions",
        disable_text: "Disable suggestions",
    },
];

impl SettingKey {
    pub fn descriptor(self) -> &'static SettingDescriptor {
        let idx = match self {
            SettingKey::AllowAnonymous => 0,
            SettingKey::ActionNotificationEnabled => 1,
            SettingKey::AllowAttachments => 2,
            SettingKey::AllowEdits => 3,
            SettingKey::Enabled => 4,
        };
        &SETTINGS[idx]
    }

    pub fn name(self) -> &'static str {
        self.descriptor().name
    }
}

impl FromStr for SettingKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SETTINGS
            .iter()
            .find(|d| d.name == s)
            .map(|d| d.key)
            .ok_or_else(|| Error::UnknownSetting(s.to_string()))
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Persisted suggestion settings of one channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelConfig {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub enabled: bool,
    pub allow_anonymous: bool,
    pub allow_attachments: bool,
    pub allow_edits: bool,
    pub action_notification_enabled: bool,
    pub restricted_role_id: Option<RoleId>,
}

impl ChannelConfig {
    pub fn setting(&self, key: SettingKey) -> bool {
        match key {
            SettingKey::AllowAnonymous => self.allow_anonymous,
            SettingKey::ActionNotificationEnabled => self.action_notification_enabled,
            SettingKey::AllowAttachments => self.allow_attachments,
            SettingKey::AllowEdits => self.allow_edits,
            SettingKey::Enabled => self.enabled,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ConfigRow {
    channel_id: i64,
    guild_id: i64,
    role_id: Option<i64>,
    allow_anonymous: bool,
    action_notification_enabled: bool,
    allow_attachments: bool,
    allow_edits: bool,
    enabled: bool,
}

impl From<ConfigRow> for ChannelConfig {
    fn from(r: ConfigRow) -> Self {
        Self {
            guild_id: GuildId(r.guild_id),
            channel_id: ChannelId(r.channel_id),
            enabled: r.enabled,
            allow_anonymous: r.allow_anonymous,
            allow_attachments: r.allow_attachments,
            allow_edits: r.allow_edits,
            action_notification_enabled: r.action_notification_enabled,
            restricted_role_id: r.role_id.map(RoleId),
        }
    }
}

/// SQLite-backed channel config store.
#[derive(Clone)]
pub struct ConfigStore {
    pool: SqlitePool,
}

impl ConfigStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, guild: GuildId, channel: ChannelId) -> Result<ChannelConfig> {
        let res = sqlx::query("INSERT INTO config (guild_id, channel_id) VALUES (?, ?)")
            .bind(guild.0)
            .bind(channel.0)
            .execute(&self.pool)
            .await;

        match res {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => return Err(Error::AlreadyConfigured(channel)),
            Err(e) => return Err(e.into()),
        }

        self.get(channel)
            .await?
            .ok_or(Error::NotConfigured(channel))
    }

    pub async fn get(&self, channel: ChannelId) -> Result<Option<ChannelConfig>> {
        let row = sqlx::query_as::<_, ConfigRow>(
            r#"SELECT channel_id, guild_id, role_id, allow_anonymous, action_notification_enabled,
                      allow_attachments, allow_edits, enabled
               FROM config WHERE channel_id = ?"#,
        )
        .bind(channel.0)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    /// Config of `channel`, only if it belongs to `guild`.
    pub async fn get_in_guild(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<Option<ChannelConfig>> {
        Ok(self.get(channel).await?.filter(|c| c.guild_id == guild))
    }

    /// Channels configured for `guild`, oldest setup first.
    pub async fn list_channels(&self, guild: GuildId) -> Result<Vec<ChannelId>> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT channel_id FROM config WHERE guild_id = ? ORDER BY rowid")
                .bind(guild.0)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| ChannelId(id)).collect())
    }

    pub async fn set_field(&self, channel: ChannelId, key: SettingKey, value: bool) -> Result<()> {
        // Column names come from the static descriptor table, never from input.
        let sql = format!("UPDATE config SET {} = ? WHERE channel_id = ?", key.name());
        let res = sqlx::query(&sql)
            .bind(value)
            .bind(channel.0)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(Error::NotConfigured(channel));
        }
        Ok(())
    }

    pub async fn set_restriction(&self, channel: ChannelId, role: Option<RoleId>) -> Result<()> {
        let res = sqlx::query("UPDATE config SET role_id = ? WHERE channel_id = ?")
            .bind(role.map(|r| r.0))
            .bind(channel.0)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(Error::NotConfigured(channel));
        }
        Ok(())
    }

    /// Returns whether a row was removed.
    pub async fn delete(&self, guild: GuildId, channel: ChannelId) -> Result<bool> {
        let res = sqlx::query("DELETE FROM config WHERE channel_id = ? AND guild_id = ?")
            .bind(channel.0)
            .bind(guild.0)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
