/// Inline keyboard (buttons) attached to dialog prompts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(label: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            callback_data: callback_data.into(),
        }
    }
}

impl InlineKeyboard {
    pub fn new(rows: Vec<Vec<InlineButton>>) -> Self {
        Self { rows }
    }

    /// Convenience for "one button per row" layouts.
    pub fn one_per_row(buttons: Vec<InlineButton>) -> Self {
        Self {
            rows: buttons.into_iter().map(|b| vec![b]).collect(),
        }
    }

    pub fn push_row(&mut self, row: Vec<InlineButton>) {
        self.rows.push(row);
    }

    pub fn buttons(&self) -> impl Iterator<Item = &InlineButton> {
        self.rows.iter().flatten()
    }
}

/// Shorten a button label to `max_len` characters.
pub fn truncate_label(label: &str, max_len: usize) -> String {
    if label.chars().count() > max_len {
        format!("{}...", label.chars().take(max_len).collect::<String>())
    } else {
        label.to_string()
    }
}

/// A rendered suggestion: HTML body plus an optional attached media reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CardContent {
    pub html: String,
    pub attachment: Option<String>,
    /// RGB accent. Messengers without colored embeds rely on the marker in `html`.
    pub color: u32,
}

/// Capabilities / feature flags of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub supports_html: bool,
    pub supports_edit: bool,
    pub supports_reactions: bool,
    pub supports_inline_keyboards: bool,
    pub max_message_len: usize,
    /// Text sent alongside media has its own, shorter limit.
    pub max_caption_len: usize,
}
