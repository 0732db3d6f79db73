use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use crate::{
    domain::{ChannelId, GuildId, SequenceId, UserId},
    errors::Error,
    store::SuggestionStatus,
    Result,
};

// ============== Timestamp Helpers ==============

/// RFC3339 timestamp in UTC (for logs/telemetry).
pub fn iso_timestamp_utc() -> String {
    Utc::now().to_rfc3339()
}

// ============== Audit Logging ==============

const AUDIT_MAX_TEXT: usize = 500;

#[derive(Clone, Debug, Default, Serialize)]
pub struct AuditEvent {
    pub timestamp: String,
    pub event: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_id: Option<SequenceId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anonymous: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl AuditEvent {
    fn base(event: &str, user: UserId, username: &str) -> Self {
        Self {
            timestamp: iso_timestamp_utc(),
            event: event.to_string(),
            user_id: Some(user.0),
            username: Some(username.to_string()),
            ..Self::default()
        }
    }

    /// Channel configuration changed (`setup`, `remove_setup`, `restrict`, a setting, ...).
    pub fn setup(
        user: UserId,
        username: &str,
        guild: GuildId,
        channel: ChannelId,
        action: &str,
    ) -> Self {
        Self {
            guild_id: Some(guild.0),
            channel_id: Some(channel.0),
            action: Some(action.to_string()),
            ..Self::base("setup", user, username)
        }
    }

    pub fn post(
        user: UserId,
        username: &str,
        guild: GuildId,
        channel: ChannelId,
        sequence_id: SequenceId,
        content: Option<&str>,
        anonymous: bool,
    ) -> Self {
        Self {
            guild_id: Some(guild.0),
            channel_id: Some(channel.0),
            sequence_id: Some(sequence_id),
            content: content.map(str::to_string),
            anonymous: Some(anonymous),
            ..Self::base("post", user, username)
        }
    }

    pub fn moderation(
        user: UserId,
        username: &str,
        guild: GuildId,
        sequence_id: SequenceId,
        status: SuggestionStatus,
        note: Option<&str>,
    ) -> Self {
        Self {
            guild_id: Some(guild.0),
            sequence_id: Some(sequence_id),
            action: Some(status.to_string()),
            reason: note.map(str::to_string),
            ..Self::base("moderation", user, username)
        }
    }

    pub fn blacklist(
        user: UserId,
        username: &str,
        channel: ChannelId,
        target: UserId,
        added: bool,
        reason: Option<&str>,
    ) -> Self {
        Self {
            channel_id: Some(channel.0),
            target_user_id: Some(target.0),
            action: Some(if added { "add" } else { "remove" }.to_string()),
            reason: reason.map(str::to_string),
            ..Self::base("blacklist", user, username)
        }
    }

    pub fn error(user: UserId, username: &str, error: &str, context: Option<&str>) -> Self {
        Self {
            error: Some(error.to_string()),
            context: context.map(str::to_string),
            ..Self::base("error", user, username)
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuditLogger {
    path: PathBuf,
    json: bool,
}

impl AuditLogger {
    pub fn new(path: impl Into<PathBuf>, json: bool) -> Self {
        Self {
            path: path.into(),
            json,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, mut event: AuditEvent) -> Result<()> {
        for field in [&mut event.content, &mut event.reason, &mut event.error] {
            if let Some(s) = field.as_deref() {
                *field = Some(truncate_text(s, AUDIT_MAX_TEXT));
            }
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        if self.json {
            let line = serde_json::to_string(&event)?;
            writeln!(file, "{line}")?;
            return Ok(());
        }

        // Plain text format for readability.
        let mut out = String::new();
        out.push('\n');
        out.push_str(&"=".repeat(60));

        let value = serde_json::to_value(&event)?;
        let Some(obj) = value.as_object() else {
            return Err(Error::InvariantViolation(
                "audit event is not a JSON object".to_string(),
            ));
        };
        for (k, v) in obj {
            out.push('\n');
            out.push_str(k);
            out.push_str(": ");
            out.push_str(&json_value_to_display(v));
        }
        out.push('\n');

        file.write_all(out.as_bytes())?;
        Ok(())
    }

    /// [`Self::write`], with failures logged instead of returned.
    pub fn record(&self, event: AuditEvent) {
        let kind = event.event.clone();
        if let Err(e) = self.write(event) {
            warn!(event = %kind, path = %self.path.display(), error = %e, "failed to write audit event");
        }
    }
}

pub fn truncate_text(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let mut out = s.chars().take(max_len).collect::<String>();
    out.push_str("...");
    out
}

fn json_value_to_display(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.to_string(),
        other => serde_json::to_string(other).unwrap_or_else(|_| "<unprintable>".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_file(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let pid = std::process::id();
        std::env::temp_dir().join(format!("{prefix}-{pid}-{ts}.log"))
    }

    #[test]
    fn truncate_text_adds_ellipsis() {
        let s = "a".repeat(AUDIT_MAX_TEXT + 10);
        let t = truncate_text(&s, AUDIT_MAX_TEXT);
        assert!(t.ends_with("..."));
        assert_eq!(t.chars().count(), AUDIT_MAX_TEXT + 3);
        assert_eq!(truncate_text("short", AUDIT_MAX_TEXT), "short");
    }

    #[test]
    fn audit_truncates_content_on_write() {
        let log = AuditLogger::new(tmp_file("oxide-audit-test"), true);
        let content = "x".repeat(AUDIT_MAX_TEXT + 1);
        let ev = AuditEvent::post(
            UserId(1),
            "u",
            GuildId(2),
            ChannelId(3),
            4,
            Some(&content),
            false,
        );
        let line = serde_json::to_string(&ev).unwrap();
        assert!(line.contains(&content)); // raw event not truncated yet

        log.write(ev).unwrap();
        let written = std::fs::read_to_string(log.path()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(written.trim()).unwrap();
        assert_eq!(parsed["event"], "post");
        assert_eq!(parsed["sequence_id"], 4);
        assert!(parsed["content"].as_str().unwrap().ends_with("..."));
        assert!(parsed.get("error").is_none());
        let _ = std::fs::remove_file(log.path());
    }

    #[test]
    fn plain_text_audit_lists_fields() {
        let log = AuditLogger::new(tmp_file("oxide-audit-plain"), false);
        log.write(AuditEvent::moderation(
            UserId(9),
            "mod",
            GuildId(1),
            7,
            SuggestionStatus::Accepted,
            Some("great"),
        ))
        .unwrap();
        log.record(AuditEvent::blacklist(
            UserId(9),
            "mod",
            ChannelId(3),
            UserId(5),
            true,
            None,
        ));

        let written = std::fs::read_to_string(log.path()).unwrap();
        assert!(written.contains("event: moderation"));
        assert!(written.contains("action: accepted"));
        assert!(written.contains("reason: great"));
        assert!(written.contains("target_user_id: 5"));
        let _ = std::fs::remove_file(log.path());
    }
}
