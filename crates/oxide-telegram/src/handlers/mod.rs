//! Telegram update handlers.
//!
//! Commands become [`SuggestionService`](oxide_core::suggestions::SuggestionService)
//! calls; button presses are routed to the open dialog they belong to.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};

use crate::router::AppState;
mod callback;
mod commands;

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    callback::handle_callback(bot, q, state).await
}

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    // Photos carry their command in the caption.
    let text = msg.text().or(msg.caption()).unwrap_or_default();
    if text.starts_with('/') {
        return commands::handle_command(msg, state).await;
    }
    Ok(())
}
