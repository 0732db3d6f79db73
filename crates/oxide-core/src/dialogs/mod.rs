//! Short-lived interactive exchanges with a single authorized actor.
//!
//! Each dialog kind is a plain state machine (`apply(event) -> Step`) plus an async
//! driver that renders it through the [`MessagingPort`] and feeds it events from a
//! [`DialogSession`]. The host router turns button presses into [`DialogEvent`]s and
//! hands them to [`DialogHub::dispatch`].

pub mod confirmation;
pub mod selection;
pub mod settings;

use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use tokio::{sync::mpsc, time::Instant};
use tracing::debug;

use crate::{domain::UserId, messaging::port::MessagingPort};

pub const NOT_FOR_YOU: &str = "This menu isn't for you.";
pub const EXPIRED: &str = "This menu has expired.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DialogId(pub u64);

impl fmt::Display for DialogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DialogAction {
    /// Pick one option by its key.
    Choose(String),
    /// Submit an on/off value.
    Set(bool),
    Confirm,
    Cancel,
    Close,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DialogEvent {
    pub dialog_id: DialogId,
    pub actor: UserId,
    pub action: DialogAction,
    /// Platform handle used to acknowledge the button press.
    pub callback_id: Option<String>,
}

/// Result of applying one event to a dialog state machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step<T> {
    /// Accepted; the dialog keeps waiting (re-render if state changed).
    Continue,
    /// Event from someone other than the invoker. State untouched.
    Rejected,
    /// Not meaningful in the current state. State untouched.
    Ignored,
    Done(T),
}

const CALLBACK_PREFIX: &str = "dlg";

/// Encode a button payload: `dlg:<id>:<verb>[:<arg>]`.
pub fn callback_data(id: DialogId, action: &DialogAction) -> String {
    match action {
        DialogAction::Choose(key) => format!("{CALLBACK_PREFIX}:{id}:pick:{key}"),
        DialogAction::Set(v) => format!("{CALLBACK_PREFIX}:{id}:set:{}", u8::from(*v)),
        DialogAction::Confirm => format!("{CALLBACK_PREFIX}:{id}:ok"),
        DialogAction::Cancel => format!("{CALLBACK_PREFIX}:{id}:no"),
        DialogAction::Close => format!("{CALLBACK_PREFIX}:{id}:close"),
    }
}

/// Decode a button payload produced by [`callback_data`].
pub fn parse_callback(data: &str) -> Option<(DialogId, DialogAction)> {
    let mut parts = data.splitn(4, ':');
    if parts.next()? != CALLBACK_PREFIX {
        return None;
    }
    let id = DialogId(parts.next()?.parse().ok()?);
    let verb = parts.next()?;
    let arg = parts.next();

    let action = match (verb, arg) {
        ("pick", Some(key)) if !key.is_empty() => DialogAction::Choose(key.to_string()),
        ("set", Some("1")) => DialogAction::Set(true),
        ("set", Some("0")) => DialogAction::Set(false),
        ("ok", None) => DialogAction::Confirm,
        ("no", None) => DialogAction::Cancel,
        ("close", None) => DialogAction::Close,
        _ => return None,
    };
    Some((id, action))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    Delivered,
    /// No open dialog with that id (finished, timed out, or never existed).
    Expired,
}

/// Registry of open dialogs.
#[derive(Default)]
pub struct DialogHub {
    next_id: AtomicU64,
    open: Mutex<HashMap<DialogId, mpsc::UnboundedSender<DialogEvent>>>,
}

impl DialogHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a new dialog. It stays routable until the session is dropped.
    pub fn open(self: &Arc<Self>, timeout: Duration) -> DialogSession {
        let id = DialogId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (tx, rx) = mpsc::unbounded_channel();
        self.registry().insert(id, tx);
        debug!(dialog = %id, "dialog opened");

        DialogSession {
            id,
            rx,
            hub: Arc::clone(self),
            timeout,
            deadline: Instant::now() + timeout,
        }
    }

    pub fn dispatch(&self, event: DialogEvent) -> Dispatch {
        let tx = self.registry().get(&event.dialog_id).cloned();
        match tx {
            Some(tx) if tx.send(event).is_ok() => Dispatch::Delivered,
            _ => Dispatch::Expired,
        }
    }

    pub fn open_count(&self) -> usize {
        self.registry().len()
    }

    fn close(&self, id: DialogId) {
        self.registry().remove(&id);
        debug!(dialog = %id, "dialog closed");
    }

    fn registry(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<DialogId, mpsc::UnboundedSender<DialogEvent>>> {
        // The map holds no invariants a panicking holder could break.
        self.open.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// The receiving end of one open dialog.
pub struct DialogSession {
    id: DialogId,
    rx: mpsc::UnboundedReceiver<DialogEvent>,
    hub: Arc<DialogHub>,
    timeout: Duration,
    deadline: Instant,
}

impl DialogSession {
    pub fn id(&self) -> DialogId {
        self.id
    }

    /// Wait for the next event; `None` once the window has elapsed.
    pub async fn next_event(&mut self) -> Option<DialogEvent> {
        tokio::time::timeout_at(self.deadline, self.rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Restart the timeout window.
    pub fn touch(&mut self) {
        self.deadline = Instant::now() + self.timeout;
    }
}

impl Drop for DialogSession {
    fn drop(&mut self) {
        self.hub.close(self.id);
    }
}

/// What a dialog driver needs from the outside world.
#[derive(Clone)]
pub struct DialogContext {
    pub hub: Arc<DialogHub>,
    pub messenger: Arc<dyn MessagingPort>,
    pub timeout: Duration,
    pub ack_interval: Duration,
    pub label_max: usize,
}

impl DialogContext {
    /// Acknowledge a button press. Best-effort.
    pub(crate) async fn answer(&self, event: &DialogEvent, text: Option<&str>) {
        if let Some(cb) = event.callback_id.as_deref() {
            if let Err(e) = self.messenger.answer_callback_query(cb, text).await {
                debug!(dialog = %event.dialog_id, error = %e, "failed to answer callback");
            }
        }
    }

    /// Answer a press according to the step it produced.
    pub(crate) async fn acknowledge<T>(&self, event: &DialogEvent, step: &Step<T>) {
        match step {
            Step::Rejected => self.answer(event, Some(NOT_FOR_YOU)).await,
            _ => self.answer(event, None).await,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording messenger shared by the dialog and controller tests.

    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::{
        domain::{ChatId, MessageId, MessageRef, UserId},
        errors::Error,
        messaging::{
            port::MessagingPort,
            types::{CardContent, InlineKeyboard, MessagingCapabilities},
        },
        Result,
    };

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum Sent {
        Html(ChatId, String),
        Edit(MessageRef, String),
        Delete(MessageRef),
        Direct(UserId, String),
        Card(ChatId, CardContent),
        EditCard(MessageRef, CardContent),
        Reaction(MessageRef, String),
        Keyboard(ChatId, String, InlineKeyboard),
        EditKeyboard(MessageRef, String, InlineKeyboard),
        Answer(String, Option<String>),
    }

    #[derive(Default)]
    pub struct FakeMessenger {
        pub sent: Mutex<Vec<Sent>>,
        pub next_id: Mutex<i32>,
        pub reactions: bool,
        pub fail_cards: bool,
        pub fail_reactions: bool,
        pub fail_direct: bool,
        pub fail_edit_card: bool,
        pub missing: Mutex<Vec<MessageRef>>,
    }

    impl FakeMessenger {
        pub fn with_reactions() -> Self {
            Self {
                reactions: true,
                ..Self::default()
            }
        }

        pub fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }

        pub fn keyboards(&self) -> Vec<(String, InlineKeyboard)> {
            self.sent()
                .into_iter()
                .filter_map(|s| match s {
                    Sent::Keyboard(_, t, k) | Sent::EditKeyboard(_, t, k) => Some((t, k)),
                    _ => None,
                })
                .collect()
        }

        pub fn last_keyboard(&self) -> Option<(String, InlineKeyboard)> {
            self.keyboards().pop()
        }

        pub fn edits(&self) -> Vec<String> {
            self.sent()
                .into_iter()
                .filter_map(|s| match s {
                    Sent::Edit(_, t) => Some(t),
                    _ => None,
                })
                .collect()
        }

        pub fn cards(&self) -> Vec<CardContent> {
            self.sent()
                .into_iter()
                .filter_map(|s| match s {
                    Sent::Card(_, c) => Some(c),
                    _ => None,
                })
                .collect()
        }

        pub fn answers(&self) -> Vec<Option<String>> {
            self.sent()
                .into_iter()
                .filter_map(|s| match s {
                    Sent::Answer(_, t) => Some(t),
                    _ => None,
                })
                .collect()
        }

        pub fn forget(&self, msg: MessageRef) {
            self.missing.lock().unwrap().push(msg);
        }

        fn record(&self, s: Sent) {
            self.sent.lock().unwrap().push(s);
        }

        fn next_ref(&self, chat_id: ChatId) -> MessageRef {
            let mut n = self.next_id.lock().unwrap();
            *n += 1;
            MessageRef {
                chat_id,
                message_id: MessageId(*n),
            }
        }
    }

    #[async_trait]
    impl MessagingPort for FakeMessenger {
        fn capabilities(&self) -> MessagingCapabilities {
            MessagingCapabilities {
                supports_html: true,
                supports_edit: true,
                supports_reactions: self.reactions,
                supports_inline_keyboards: true,
                max_message_len: 4096,
                max_caption_len: 1024,
            }
        }

        async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
            self.record(Sent::Html(chat_id, html.to_string()));
            Ok(self.next_ref(chat_id))
        }

        async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()> {
            self.record(Sent::Edit(msg, html.to_string()));
            Ok(())
        }

        async fn delete_message(&self, msg: MessageRef) -> Result<()> {
            self.record(Sent::Delete(msg));
            Ok(())
        }

        async fn send_direct(&self, user_id: UserId, html: &str) -> Result<MessageRef> {
            if self.fail_direct {
                return Err(Error::External("Forbidden: bot can't initiate conversation".into()));
            }
            self.record(Sent::Direct(user_id, html.to_string()));
            Ok(self.next_ref(ChatId(user_id.0)))
        }

        async fn send_card(&self, chat_id: ChatId, card: &CardContent) -> Result<MessageRef> {
            if self.fail_cards {
                return Err(Error::External("Forbidden: not enough rights".into()));
            }
            self.record(Sent::Card(chat_id, card.clone()));
            Ok(self.next_ref(chat_id))
        }

        async fn edit_card(&self, msg: MessageRef, card: &CardContent) -> Result<()> {
            if self.fail_edit_card {
                return Err(Error::External("Bad Request: message can't be edited".into()));
            }
            self.record(Sent::EditCard(msg, card.clone()));
            Ok(())
        }

        async fn message_exists(&self, msg: MessageRef) -> Result<bool> {
            Ok(!self.missing.lock().unwrap().contains(&msg))
        }

        async fn set_reaction(&self, msg: MessageRef, emoji: &str) -> Result<()> {
            if self.fail_reactions {
                return Err(Error::External("Bad Request: reaction invalid".into()));
            }
            self.record(Sent::Reaction(msg, emoji.to_string()));
            Ok(())
        }

        async fn send_inline_keyboard(
            &self,
            chat_id: ChatId,
            text: &str,
            keyboard: InlineKeyboard,
        ) -> Result<MessageRef> {
            self.record(Sent::Keyboard(chat_id, text.to_string(), keyboard));
            Ok(self.next_ref(chat_id))
        }

        async fn edit_inline_keyboard(
            &self,
            msg: MessageRef,
            text: &str,
            keyboard: InlineKeyboard,
        ) -> Result<()> {
            self.record(Sent::EditKeyboard(msg, text.to_string(), keyboard));
            Ok(())
        }

        async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
            self.record(Sent::Answer(
                callback_id.to_string(),
                text.map(str::to_string),
            ));
            Ok(())
        }
    }

    /// Poll until the messenger has recorded at least `n` keyboards.
    pub async fn wait_for_keyboards(m: &FakeMessenger, n: usize) {
        for _ in 0..200 {
            if m.keyboards().len() >= n {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("expected {n} keyboards, saw {}", m.keyboards().len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_payload_round_trips_every_verb() {
        let id = DialogId(42);
        for action in [
            DialogAction::Choose("-1001234567890".to_string()),
            DialogAction::Choose("action_notification_enabled".to_string()),
            DialogAction::Set(true),
            DialogAction::Set(false),
            DialogAction::Confirm,
            DialogAction::Cancel,
            DialogAction::Close,
        ] {
            let data = callback_data(id, &action);
            assert!(data.len() <= 64, "{data} exceeds callback limit");
            assert_eq!(parse_callback(&data), Some((id, action)));
        }
    }

    #[test]
    fn foreign_or_malformed_payloads_are_ignored() {
        assert_eq!(parse_callback("askuser:1:2"), None);
        assert_eq!(parse_callback("dlg:x:ok"), None);
        assert_eq!(parse_callback("dlg:1:pick"), None);
        assert_eq!(parse_callback("dlg:1:pick:"), None);
        assert_eq!(parse_callback("dlg:1:set:2"), None);
        assert_eq!(parse_callback("dlg:1:ok:extra"), None);
        assert_eq!(parse_callback("dlg:1:launch"), None);
    }

    #[tokio::test]
    async fn dispatch_reaches_open_dialog_only() {
        let hub = DialogHub::new();
        let mut session = hub.open(Duration::from_secs(5));
        let id = session.id();

        let event = DialogEvent {
            dialog_id: id,
            actor: UserId(1),
            action: DialogAction::Confirm,
            callback_id: None,
        };
        assert_eq!(hub.dispatch(event.clone()), Dispatch::Delivered);
        assert_eq!(session.next_event().await, Some(event.clone()));

        drop(session);
        assert_eq!(hub.open_count(), 0);
        assert_eq!(hub.dispatch(event), Dispatch::Expired);
    }

    #[tokio::test]
    async fn session_times_out_and_touch_extends() {
        let hub = DialogHub::new();
        let mut session = hub.open(Duration::from_millis(40));
        assert_eq!(session.next_event().await, None);

        session.touch();
        let id = session.id();
        let hub2 = Arc::clone(&hub);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            hub2.dispatch(DialogEvent {
                dialog_id: id,
                actor: UserId(1),
                action: DialogAction::Close,
                callback_id: None,
            });
        });
        assert!(session.next_event().await.is_some());
    }

    #[tokio::test]
    async fn dialog_ids_are_unique() {
        let hub = DialogHub::new();
        let a = hub.open(Duration::from_secs(1));
        let b = hub.open(Duration::from_secs(1));
        assert_ne!(a.id(), b.id());
        assert_eq!(hub.open_count(), 2);
    }
}
