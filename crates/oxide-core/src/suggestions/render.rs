//! HTML for suggestion cards, author notices and settings summaries.

use crate::{
    domain::{SequenceId, UserId},
    formatting::{blockquote, escape_html, user_link},
    messaging::types::CardContent,
    store::{ChannelConfig, Suggestion, SuggestionStatus, SETTINGS},
};

pub const NEUTRAL: u32 = 0x36393f;
pub const SUCCESS: u32 = 0x3ea577;
pub const WARNING: u32 = 0xfe7b75;
pub const DANGER: u32 = 0xf7434f;

pub const UPVOTE: &str = "👍";
pub const DOWNVOTE: &str = "👎";

/// Marker emoji, label and accent color for a status.
pub fn status_style(status: SuggestionStatus) -> (&'static str, &'static str, u32) {
    match status {
        SuggestionStatus::Pending => ("🗳️", "Pending", NEUTRAL),
        SuggestionStatus::Accepted => ("✅", "Accepted", SUCCESS),
        SuggestionStatus::Declined => ("⛔", "Declined", DANGER),
        SuggestionStatus::Considered => ("🤔", "Considered", WARNING),
    }
}

/// What a card shows. Borrowed so both a fresh post and a stored record can render.
#[derive(Clone, Copy, Debug)]
pub struct CardView<'a> {
    /// `None` before the post is committed; the number is only known once reserved.
    pub sequence_id: Option<SequenceId>,
    pub author: UserId,
    pub author_name: &'a str,
    pub anonymous: bool,
    pub content: Option<&'a str>,
    pub attachment: Option<&'a str>,
    pub status: SuggestionStatus,
    pub note: Option<&'a str>,
}

impl<'a> CardView<'a> {
    pub fn of(s: &'a Suggestion, author_name: &'a str) -> Self {
        Self {
            sequence_id: Some(s.sequence_id),
            author: s.author_id,
            author_name,
            anonymous: s.anonymous,
            content: s.content.as_deref(),
            attachment: s.attachment_url.as_deref(),
            status: s.status,
            note: s.action_note.as_deref(),
        }
    }
}

pub fn card(view: &CardView<'_>) -> CardContent {
    let (marker, label, color) = status_style(view.status);
    let author = if view.anonymous {
        "<i>Anonymous</i>".to_string()
    } else {
        user_link(view.author, view.author_name)
    };

    let heading = match view.sequence_id {
        Some(id) => format!("Suggestion #{id}"),
        None => "New suggestion".to_string(),
    };
    let mut html = format!("{marker} <b>{heading}</b>\nFrom {author}");
    if let Some(content) = view.content {
        html.push('\n');
        html.push_str(&blockquote(content));
    }
    html.push_str(&format!("\n<b>Status:</b> {label}"));
    if let Some(note) = view.note.map(str::trim).filter(|n| !n.is_empty()) {
        html.push_str(&format!("\n<b>Note:</b> <i>{}</i>", escape_html(note)));
    }

    CardContent {
        html,
        attachment: view.attachment.map(str::to_string),
        color,
    }
}

/// Private notice telling an author their suggestion was actioned.
pub fn author_notice(s: &Suggestion, channel_title: &str) -> String {
    let (marker, label, _) = status_style(s.status);
    let mut html = format!(
        "{marker} Your suggestion #{} in <b>{}</b> was <b>{}</b>.",
        s.sequence_id,
        escape_html(channel_title),
        label.to_lowercase()
    );
    if let Some(note) = s.action_note.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        html.push_str(&format!("\n<b>Note:</b> <i>{}</i>", escape_html(note)));
    }
    html
}

/// One line per setting, in menu order.
pub fn settings_summary(config: &ChannelConfig, channel_title: &str) -> String {
    let mut html = format!(
        "⚙️ <b>Suggestion settings for {}</b>\n",
        escape_html(channel_title)
    );
    for d in SETTINGS.iter() {
        let icon = if config.setting(d.key) { "✅" } else { "❌" };
        html.push_str(&format!("\n{icon} {} (<code>{}</code>)", d.label, d.name));
    }
    match config.restricted_role_id {
        Some(role) => html.push_str(&format!("\n\n🔒 Restricted to members of <code>{role}</code>")),
        None => html.push_str("\n\n🔓 Anyone can post"),
    }
    html
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::{ChannelId, ChatId, GuildId, MessageId, MessageRef, RoleId};

    fn view() -> CardView<'static> {
        CardView {
            sequence_id: Some(3),
            author: UserId(7),
            author_name: "Bob",
            anonymous: false,
            content: Some("add a <dark> mode"),
            attachment: None,
            status: SuggestionStatus::Pending,
            note: None,
        }
    }

    #[test]
    fn pending_card_shows_author_and_escaped_content() {
        let card = card(&view());
        assert_eq!(card.color, NEUTRAL);
        assert!(card.html.starts_with("🗳️ <b>Suggestion #3</b>"));
        assert!(card.html.contains("tg://user?id=7"));
        assert!(card.html.contains("add a &lt;dark&gt; mode"));
        assert!(card.html.ends_with("<b>Status:</b> Pending"));
    }

    #[test]
    fn preview_card_has_no_number_yet() {
        let card = card(&CardView {
            sequence_id: None,
            ..view()
        });
        assert!(card.html.starts_with("🗳️ <b>New suggestion</b>"));
        assert!(!card.html.contains('#'));
    }

    #[test]
    fn anonymous_card_hides_author() {
        let card = card(&CardView {
            anonymous: true,
            ..view()
        });
        assert!(card.html.contains("<i>Anonymous</i>"));
        assert!(!card.html.contains("tg://user"));
    }

    #[test]
    fn resolved_card_carries_marker_color_and_note() {
        let card = card(&CardView {
            status: SuggestionStatus::Declined,
            note: Some("out of scope"),
            attachment: Some("file-1"),
            ..view()
        });
        assert_eq!(card.color, DANGER);
        assert!(card.html.starts_with("⛔"));
        assert!(card.html.contains("<b>Note:</b> <i>out of scope</i>"));
        assert_eq!(card.attachment.as_deref(), Some("file-1"));
    }

    #[test]
    fn notice_names_channel_and_status() {
        let s = Suggestion {
            guild_id: GuildId(1),
            sequence_id: 4,
            channel_id: ChannelId(10),
            author_id: UserId(7),
            message: MessageRef {
                chat_id: ChatId(10),
                message_id: MessageId(1),
            },
            content: Some("x".into()),
            attachment_url: None,
            anonymous: false,
            status: SuggestionStatus::Accepted,
            edited_at: Utc::now(),
            action_updated_at: Some(Utc::now()),
            action_note: Some("great".into()),
        };
        let html = author_notice(&s, "ideas");
        assert!(html.contains("#4 in <b>ideas</b> was <b>accepted</b>"));
        assert!(html.ends_with("<i>great</i>"));
    }

    #[test]
    fn summary_lists_settings_and_restriction() {
        let config = ChannelConfig {
            guild_id: GuildId(1),
            channel_id: ChannelId(10),
            enabled: true,
            allow_anonymous: false,
            allow_attachments: true,
            allow_edits: false,
            action_notification_enabled: false,
            restricted_role_id: Some(RoleId(-100)),
        };
        let html = settings_summary(&config, "ideas");
        let lines: Vec<_> = html.lines().filter(|l| l.contains("<code>")).collect();
        assert_eq!(lines.len(), 6);
        assert!(lines[0].starts_with("❌ Anonymous suggestions"));
        assert!(lines[2].starts_with("✅ Attachments"));
        assert!(lines[5].contains("-100"));
    }
}
