use std::sync::Arc;

use teloxide::prelude::*;
use tracing::debug;

use oxide_core::{
    dialogs::{parse_callback, DialogEvent, Dispatch, EXPIRED},
    domain::UserId,
};

use crate::router::AppState;

/// Button payload plus presser, as a dialog event.
fn to_event(data: &str, actor: UserId, callback_id: &str) -> Option<DialogEvent> {
    let (dialog_id, action) = parse_callback(data)?;
    Some(DialogEvent {
        dialog_id,
        actor,
        action,
        callback_id: Some(callback_id.to_string()),
    })
}

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let data = q.data.clone().unwrap_or_default();
    let actor = UserId(q.from.id.0 as i64);

    let Some(event) = to_event(&data, actor, &q.id) else {
        // Always answer callback query eventually.
        let _ = bot.answer_callback_query(q.id).await;
        return Ok(());
    };

    let dialog = event.dialog_id;
    match state.hub.dispatch(event) {
        // The dialog answers the query itself.
        Dispatch::Delivered => debug!(dialog = %dialog, user = %actor, "button press routed"),
        Dispatch::Expired => {
            let _ = bot.answer_callback_query(q.id).text(EXPIRED).await;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxide_core::dialogs::{DialogAction, DialogId};

    #[test]
    fn dialog_payloads_become_events() {
        let ev = to_event("dlg:12:pick:-100500", UserId(7), "cb-1").unwrap();
        assert_eq!(ev.dialog_id, DialogId(12));
        assert_eq!(ev.actor, UserId(7));
        assert_eq!(ev.action, DialogAction::Choose("-100500".to_string()));
        assert_eq!(ev.callback_id.as_deref(), Some("cb-1"));
    }

    #[test]
    fn foreign_payloads_are_dropped() {
        assert!(to_event("askuser:1:0", UserId(7), "cb").is_none());
        assert!(to_event("", UserId(7), "cb").is_none());
    }
}
