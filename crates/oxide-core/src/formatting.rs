//! HTML helpers for the subset of markup messengers accept (`<b>`, `<i>`, `<a>`, `<blockquote>`).

use crate::domain::UserId;

/// Escape HTML special characters.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// A mention of `user` rendered as an inline link.
pub fn user_link(user: UserId, label: &str) -> String {
    format!(
        "<a href=\"tg://user?id={}\">{}</a>",
        user.0,
        escape_html(label)
    )
}

/// Quote user-supplied text, escaping it.
pub fn blockquote(text: &str) -> String {
    format!("<blockquote>{}</blockquote>", escape_html(text.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_html() {
        let s = r#"<a href="x&y">"#;
        assert_eq!(escape_html(s), "&lt;a href=&quot;x&amp;y&quot;&gt;");
    }

    #[test]
    fn user_link_escapes_label() {
        assert_eq!(
            user_link(UserId(7), "<bob>"),
            "<a href=\"tg://user?id=7\">&lt;bob&gt;</a>"
        );
    }

    #[test]
    fn blockquote_trims_and_escapes() {
        assert_eq!(
            blockquote("  more <cats>\n"),
            "<blockquote>more &lt;cats&gt;</blockquote>"
        );
    }
}
