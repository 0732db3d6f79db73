use async_trait::async_trait;

use crate::{
    domain::{ChannelId, ChatId, GuildId, MessageRef, RoleId, UserId},
    messaging::types::{CardContent, InlineKeyboard, MessagingCapabilities},
    Result,
};

/// Cross-messenger port.
///
/// Telegram is the first implementation; the shape is designed so other adapters
/// can fit behind the same interface with capability flags.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef>;
    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()>;
    async fn delete_message(&self, msg: MessageRef) -> Result<()>;

    /// Private message to a user. Fails when the user cannot be reached.
    async fn send_direct(&self, user_id: UserId, html: &str) -> Result<MessageRef>;

    async fn send_card(&self, chat_id: ChatId, card: &CardContent) -> Result<MessageRef>;
    async fn edit_card(&self, msg: MessageRef, card: &CardContent) -> Result<()>;

    /// `Ok(false)` when the message was deleted or is otherwise gone.
    async fn message_exists(&self, msg: MessageRef) -> Result<bool>;

    async fn set_reaction(&self, msg: MessageRef, emoji: &str) -> Result<()>;

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef>;

    async fn edit_inline_keyboard(
        &self,
        msg: MessageRef,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<()>;

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()>;
}

/// Lookups about chats and members that the lifecycle needs but does not own.
#[async_trait]
pub trait DirectoryPort: Send + Sync {
    /// Display title of a channel, or `None` when the bot can no longer reach it.
    async fn channel_title(&self, channel: ChannelId) -> Result<Option<String>>;

    /// Name to show for a user, if the directory knows one.
    async fn display_name(&self, guild: GuildId, user: UserId) -> Result<Option<String>>;

    async fn has_role(&self, guild: GuildId, user: UserId, role: RoleId) -> Result<bool>;

    /// Whether the user may manage suggestion channels in the guild.
    async fn can_manage(&self, guild: GuildId, user: UserId) -> Result<bool>;
}
