//! Yes/no gate in front of destructive operations.

use tracing::{debug, warn};

use crate::{
    domain::{ChatId, MessageRef, UserId},
    messaging::types::{InlineButton, InlineKeyboard},
    Result,
};

use super::{callback_data, DialogAction, DialogContext, DialogEvent, DialogId, Step};

pub const TIMED_OUT: &str = "You didn't respond in time.";
pub const CANCELED: &str = "No changes were made.";

#[derive(Clone, Debug)]
pub struct YesNo {
    invoker: UserId,
}

impl YesNo {
    pub fn new(invoker: UserId) -> Self {
        Self { invoker }
    }

    pub fn keyboard(&self, id: DialogId) -> InlineKeyboard {
        InlineKeyboard::new(vec![vec![
            InlineButton::new("Confirm", callback_data(id, &DialogAction::Confirm)),
            InlineButton::new("Cancel", callback_data(id, &DialogAction::Cancel)),
        ]])
    }

    pub fn apply(&mut self, event: &DialogEvent) -> Step<bool> {
        if event.actor != self.invoker {
            return Step::Rejected;
        }
        match event.action {
            DialogAction::Confirm => Step::Done(true),
            DialogAction::Cancel => Step::Done(false),
            _ => Step::Ignored,
        }
    }
}

/// Outcome of a confirmation prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Confirmation {
    /// `Some(true)` confirmed, `Some(false)` canceled, `None` timed out.
    pub answer: Option<bool>,
    /// The prompt message. Left untouched on confirm so the caller can replace it
    /// with the result of the guarded operation.
    pub message: MessageRef,
}

pub async fn confirm(
    ctx: &DialogContext,
    chat: ChatId,
    invoker: UserId,
    prompt: &str,
) -> Result<Confirmation> {
    let mut dialog = YesNo::new(invoker);
    let mut session = ctx.hub.open(ctx.timeout);
    let message = ctx
        .messenger
        .send_inline_keyboard(chat, prompt, dialog.keyboard(session.id()))
        .await?;

    let answer = loop {
        let Some(event) = session.next_event().await else {
            break None;
        };
        let step = dialog.apply(&event);
        ctx.acknowledge(&event, &step).await;
        if let Step::Done(answer) = step {
            break Some(answer);
        }
    };
    debug!(dialog = %session.id(), ?answer, "confirmation finished");
    drop(session);

    let line = match answer {
        Some(true) => None,
        Some(false) => Some(CANCELED),
        None => Some(TIMED_OUT),
    };
    if let Some(line) = line {
        if let Err(e) = ctx.messenger.edit_html(message, line).await {
            warn!(error = %e, "failed to close confirmation prompt");
        }
    }

    Ok(Confirmation { answer, message })
}
