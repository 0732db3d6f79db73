//! Telegram adapter (teloxide).
//!
//! This crate implements the `oxide-core` messaging and directory ports over the
//! Telegram Bot API, plus the command/callback router.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, InputFile, ParseMode},
    ApiError, RequestError,
};

use tokio::time::sleep;
use tracing::debug;

pub mod handlers;
pub mod router;

use oxide_core::{
    domain::{ChannelId, ChatId, GuildId, MessageId, MessageRef, RoleId, UserId},
    errors::Error,
    messaging::{
        port::{DirectoryPort, MessagingPort},
        types::{CardContent, InlineKeyboard, MessagingCapabilities},
    },
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn tg_user(user: UserId) -> teloxide::types::UserId {
        teloxide::types::UserId(user.0 as u64)
    }

    fn tg_markup(keyboard: InlineKeyboard) -> InlineKeyboardMarkup {
        InlineKeyboardMarkup::new(keyboard.rows.into_iter().map(|row| {
            row.into_iter()
                .map(|b| InlineKeyboardButton::callback(b.label, b.callback_data))
                .collect::<Vec<_>>()
        }))
    }

    fn map_err(e: RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    /// Run a request, retrying once when Telegram asks us to back off.
    async fn send_raw<T, Fut>(
        &self,
        mut op: impl FnMut() -> Fut,
    ) -> std::result::Result<T, RequestError>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    sleep(d).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn with_retry<T, Fut>(&self, op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        self.send_raw(op).await.map_err(Self::map_err)
    }

    fn sent(chat_id: ChatId, msg: &Message) -> MessageRef {
        MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        }
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_html: true,
            supports_edit: true,
            // Bot API reactions are not exposed by this teloxide release.
            supports_reactions: false,
            supports_inline_keyboards: true,
            max_message_len: 4096,
            max_caption_len: 1024,
        }
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), html.to_string())
                    .parse_mode(ParseMode::Html)
            })
            .await?;
        Ok(Self::sent(chat_id, &msg))
    }

    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .edit_message_text(
                    Self::tg_chat(msg.chat_id),
                    Self::tg_msg_id(msg.message_id),
                    html.to_string(),
                )
                .parse_mode(ParseMode::Html)
        })
        .await?;
        Ok(())
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .delete_message(Self::tg_chat(msg.chat_id), Self::tg_msg_id(msg.message_id))
        })
        .await?;
        Ok(())
    }

    async fn send_direct(&self, user_id: UserId, html: &str) -> Result<MessageRef> {
        // A private chat shares its id with the user.
        self.send_html(ChatId(user_id.0), html).await
    }

    async fn send_card(&self, chat_id: ChatId, card: &CardContent) -> Result<MessageRef> {
        let msg = match card.attachment.as_deref() {
            Some(file_id) => {
                self.with_retry(|| {
                    self.bot
                        .send_photo(Self::tg_chat(chat_id), InputFile::file_id(file_id))
                        .caption(card.html.clone())
                        .parse_mode(ParseMode::Html)
                })
                .await?
            }
            None => {
                self.with_retry(|| {
                    self.bot
                        .send_message(Self::tg_chat(chat_id), card.html.clone())
                        .parse_mode(ParseMode::Html)
                })
                .await?
            }
        };
        Ok(Self::sent(chat_id, &msg))
    }

    async fn edit_card(&self, msg: MessageRef, card: &CardContent) -> Result<()> {
        let chat = Self::tg_chat(msg.chat_id);
        let id = Self::tg_msg_id(msg.message_id);
        if card.attachment.is_some() {
            self.with_retry(|| {
                self.bot
                    .edit_message_caption(chat, id)
                    .caption(card.html.clone())
                    .parse_mode(ParseMode::Html)
            })
            .await?;
        } else {
            self.with_retry(|| {
                self.bot
                    .edit_message_text(chat, id, card.html.clone())
                    .parse_mode(ParseMode::Html)
            })
            .await?;
        }
        Ok(())
    }

    async fn message_exists(&self, msg: MessageRef) -> Result<bool> {
        // There is no "get message" call; a no-op markup edit tells us whether it is still there.
        let res = self
            .send_raw(|| {
                self.bot.edit_message_reply_markup(
                    Self::tg_chat(msg.chat_id),
                    Self::tg_msg_id(msg.message_id),
                )
            })
            .await;
        match res {
            Ok(_) | Err(RequestError::Api(ApiError::MessageNotModified)) => Ok(true),
            Err(RequestError::Api(
                ApiError::MessageToEditNotFound | ApiError::MessageIdInvalid,
            )) => Ok(false),
            Err(e) => Err(Self::map_err(e)),
        }
    }

    async fn set_reaction(&self, _msg: MessageRef, _emoji: &str) -> Result<()> {
        // Not supported by this teloxide release; `capabilities()` reports it.
        Ok(())
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        let markup = Self::tg_markup(keyboard);
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), text.to_string())
                    .parse_mode(ParseMode::Html)
                    .reply_markup(markup.clone())
            })
            .await?;
        Ok(Self::sent(chat_id, &msg))
    }

    async fn edit_inline_keyboard(
        &self,
        msg: MessageRef,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<()> {
        let markup = Self::tg_markup(keyboard);
        let res = self
            .send_raw(|| {
                self.bot
                    .edit_message_text(
                        Self::tg_chat(msg.chat_id),
                        Self::tg_msg_id(msg.message_id),
                        text.to_string(),
                    )
                    .parse_mode(ParseMode::Html)
                    .reply_markup(markup.clone())
            })
            .await;
        match res {
            Ok(_) | Err(RequestError::Api(ApiError::MessageNotModified)) => Ok(()),
            Err(e) => Err(Self::map_err(e)),
        }
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.with_retry(|| {
            let mut req = self.bot.answer_callback_query(callback_id.to_string());
            if let Some(t) = text {
                req = req.text(t.to_string());
            }
            req
        })
        .await?;
        Ok(())
    }
}

/// Chats stand in for channels and roles: a role is held by members of the role chat.
#[async_trait]
impl DirectoryPort for TelegramMessenger {
    async fn channel_title(&self, channel: ChannelId) -> Result<Option<String>> {
        match self
            .send_raw(|| self.bot.get_chat(Self::tg_chat(channel.into())))
            .await
        {
            Ok(chat) => Ok(Some(
                chat.title()
                    .or(chat.username())
                    .map(str::to_string)
                    .unwrap_or_else(|| channel.to_string()),
            )),
            Err(RequestError::Api(e)) => {
                debug!(channel = %channel, error = %e, "channel unreachable");
                Ok(None)
            }
            Err(e) => Err(Self::map_err(e)),
        }
    }

    async fn display_name(&self, guild: GuildId, user: UserId) -> Result<Option<String>> {
        match self
            .send_raw(|| {
                self.bot
                    .get_chat_member(Self::tg_chat(guild.into()), Self::tg_user(user))
            })
            .await
        {
            Ok(member) => Ok(Some(member.user.full_name())),
            Err(RequestError::Api(_)) => Ok(None),
            Err(e) => Err(Self::map_err(e)),
        }
    }

    async fn has_role(&self, _guild: GuildId, user: UserId, role: RoleId) -> Result<bool> {
        match self
            .send_raw(|| {
                self.bot
                    .get_chat_member(teloxide::types::ChatId(role.0), Self::tg_user(user))
            })
            .await
        {
            Ok(member) => Ok(member.kind.is_present()),
            Err(RequestError::Api(e)) => {
                debug!(role = %role, user = %user, error = %e, "role lookup refused");
                Ok(false)
            }
            Err(e) => Err(Self::map_err(e)),
        }
    }

    async fn can_manage(&self, guild: GuildId, user: UserId) -> Result<bool> {
        let member = self
            .with_retry(|| {
                self.bot
                    .get_chat_member(Self::tg_chat(guild.into()), Self::tg_user(user))
            })
            .await?;
        Ok(member.kind.is_privileged())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxide_core::messaging::types::InlineButton;

    #[test]
    fn keyboard_rows_are_preserved() {
        let kb = InlineKeyboard::new(vec![
            vec![InlineButton::new("a", "dlg:1:pick:a")],
            vec![
                InlineButton::new("Back", "dlg:1:no"),
                InlineButton::new("Close", "dlg:1:close"),
            ],
        ]);
        let markup = TelegramMessenger::tg_markup(kb);
        let widths: Vec<_> = markup.inline_keyboard.iter().map(Vec::len).collect();
        assert_eq!(widths, [1, 2]);
        assert_eq!(markup.inline_keyboard[1][1].text, "Close");
    }

    #[test]
    fn ids_map_onto_telegram_types() {
        assert_eq!(
            TelegramMessenger::tg_chat(ChannelId(-100123).into()),
            teloxide::types::ChatId(-100123)
        );
        assert_eq!(
            TelegramMessenger::tg_user(UserId(42)),
            teloxide::types::UserId(42)
        );
    }
}
