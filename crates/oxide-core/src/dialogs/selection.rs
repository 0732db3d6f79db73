//! "Which channel?" picker.

use tracing::{debug, warn};

use crate::{
    domain::{ChannelId, ChatId, UserId},
    formatting::escape_html,
    messaging::{
        port::DirectoryPort,
        types::{truncate_label, InlineButton, InlineKeyboard},
    },
    Result,
};

use super::{callback_data, DialogAction, DialogContext, DialogEvent, DialogId, Step};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectionOutcome {
    Selected(ChannelId),
    Canceled,
    TimedOut,
}

/// Pending choice between two or more reachable channels.
#[derive(Clone, Debug)]
pub struct ChannelPicker {
    invoker: UserId,
    candidates: Vec<(ChannelId, String)>,
}

impl ChannelPicker {
    pub fn new(invoker: UserId, candidates: Vec<(ChannelId, String)>) -> Self {
        Self {
            invoker,
            candidates,
        }
    }

    pub fn candidates(&self) -> &[(ChannelId, String)] {
        &self.candidates
    }

    fn title(&self, channel: ChannelId) -> Option<&str> {
        self.candidates
            .iter()
            .find(|(c, _)| *c == channel)
            .map(|(_, t)| t.as_str())
    }

    pub fn keyboard(&self, id: DialogId, label_max: usize) -> InlineKeyboard {
        let mut kb = InlineKeyboard::one_per_row(
            self.candidates
                .iter()
                .map(|(channel, title)| {
                    InlineButton::new(
                        truncate_label(title, label_max),
                        callback_data(id, &DialogAction::Choose(channel.0.to_string())),
                    )
                })
                .collect(),
        );
        kb.push_row(vec![InlineButton::new(
            "Cancel",
            callback_data(id, &DialogAction::Cancel),
        )]);
        kb
    }

    pub fn apply(&mut self, event: &DialogEvent) -> Step<SelectionOutcome> {
        if event.actor != self.invoker {
            return Step::Rejected;
        }
        match &event.action {
            DialogAction::Choose(key) => match key.parse::<i64>().map(ChannelId) {
                Ok(channel) if self.title(channel).is_some() => {
                    Step::Done(SelectionOutcome::Selected(channel))
                }
                _ => Step::Ignored,
            },
            DialogAction::Cancel => Step::Done(SelectionOutcome::Canceled),
            _ => Step::Ignored,
        }
    }
}

/// Resolve one channel out of `configured`.
///
/// Channels the directory can no longer reach are dropped from the candidates.
/// Returns `None` when nothing is left to choose from; a single candidate is
/// selected without showing anything.
pub async fn pick_channel(
    ctx: &DialogContext,
    directory: &dyn DirectoryPort,
    chat: ChatId,
    invoker: UserId,
    prompt: &str,
    configured: &[ChannelId],
) -> Result<Option<SelectionOutcome>> {
    let mut candidates = Vec::with_capacity(configured.len());
    for &channel in configured {
        match directory.channel_title(channel).await? {
            Some(title) => candidates.push((channel, title)),
            None => debug!(channel = %channel, "skipping unreachable channel"),
        }
    }

    match candidates.as_slice() {
        [] => return Ok(None),
        [(only, _)] => return Ok(Some(SelectionOutcome::Selected(*only))),
        _ => {}
    }

    let mut picker = ChannelPicker::new(invoker, candidates);
    let mut session = ctx.hub.open(ctx.timeout);
    let msg = ctx
        .messenger
        .send_inline_keyboard(chat, prompt, picker.keyboard(session.id(), ctx.label_max))
        .await?;

    let outcome = loop {
        let Some(event) = session.next_event().await else {
            break SelectionOutcome::TimedOut;
        };
        let step = picker.apply(&event);
        ctx.acknowledge(&event, &step).await;
        if let Step::Done(outcome) = step {
            break outcome;
        }
    };
    debug!(dialog = %session.id(), ?outcome, "selection finished");
    drop(session);

    let line = match outcome {
        SelectionOutcome::Selected(channel) => format!(
            "✅ Selected <b>{}</b>.",
            escape_html(picker.title(channel).unwrap_or_default())
        ),
        SelectionOutcome::Canceled => "Canceled.".to_string(),
        SelectionOutcome::TimedOut => "You didn't respond in time.".to_string(),
    };
    if let Err(e) = ctx.messenger.edit_html(msg, &line).await {
        warn!(error = %e, "failed to close selection prompt");
    }

    Ok(Some(outcome))
}
