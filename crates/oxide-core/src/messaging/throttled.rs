use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{ChatId, MessageRef, UserId},
    messaging::{
        port::MessagingPort,
        types::{CardContent, InlineKeyboard, MessagingCapabilities},
    },
    Result,
};

/// Spacing applied to outbound calls.
#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Between any two calls, whatever the chat.
    pub global_min_interval: Duration,
    /// Between two calls into the same chat.
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40),
            per_chat_min_interval: Duration::from_millis(1050),
        }
    }
}

/// Hands out evenly spaced start times.
#[derive(Debug)]
struct Slots {
    interval: Duration,
    next: Instant,
}

impl Slots {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Take the next free slot; returns how long to wait for it.
    fn take(&mut self, now: Instant) -> Duration {
        let start = self.next.max(now);
        self.next = start + self.interval;
        start - now
    }

    fn idle(&self, now: Instant) -> bool {
        self.next <= now
    }
}

/// Chats tracked before idle ones are swept.
const SWEEP_THRESHOLD: usize = 512;

/// Which limits a call counts against.
#[derive(Clone, Copy, Debug)]
enum Lane {
    Chat(ChatId),
    /// Callback answers carry no chat.
    Global,
}

/// [`MessagingPort`] decorator that spaces outbound calls to stay under platform flood limits.
///
/// Dialogs edit their prompt on every press, so bursts are common. Reduces 429s; does not
/// rule them out.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    cfg: ThrottleConfig,
    global: Mutex<Slots>,
    chats: Mutex<HashMap<ChatId, Slots>>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(Slots::new(cfg.global_min_interval)),
            chats: Mutex::new(HashMap::new()),
        }
    }

    async fn wait_turn(&self, lane: Lane) {
        let now = Instant::now();
        let mut wait = self.global.lock().await.take(now);

        if let Lane::Chat(chat) = lane {
            let mut chats = self.chats.lock().await;
            if chats.len() >= SWEEP_THRESHOLD {
                chats.retain(|_, slots| !slots.idle(now));
            }
            let per_chat = chats
                .entry(chat)
                .or_insert_with(|| Slots::new(self.cfg.per_chat_min_interval))
                .take(now);
            wait = wait.max(per_chat);
        }

        if !wait.is_zero() {
            sleep(wait).await;
        }
    }

    #[cfg(test)]
    async fn tracked_chats(&self) -> usize {
        self.chats.lock().await.len()
    }
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        self.inner.capabilities()
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.wait_turn(Lane::Chat(chat_id)).await;
        self.inner.send_html(chat_id, html).await
    }

    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()> {
        self.wait_turn(Lane::Chat(msg.chat_id)).await;
        self.inner.edit_html(msg, html).await
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.wait_turn(Lane::Chat(msg.chat_id)).await;
        self.inner.delete_message(msg).await
    }

    async fn send_direct(&self, user_id: UserId, html: &str) -> Result<MessageRef> {
        // The private chat shares the user's id.
        self.wait_turn(Lane::Chat(ChatId(user_id.0))).await;
        self.inner.send_direct(user_id, html).await
    }

    async fn send_card(&self, chat_id: ChatId, card: &CardContent) -> Result<MessageRef> {
        self.wait_turn(Lane::Chat(chat_id)).await;
        self.inner.send_card(chat_id, card).await
    }

    async fn edit_card(&self, msg: MessageRef, card: &CardContent) -> Result<()> {
        self.wait_turn(Lane::Chat(msg.chat_id)).await;
        self.inner.edit_card(msg, card).await
    }

    async fn message_exists(&self, msg: MessageRef) -> Result<bool> {
        self.wait_turn(Lane::Chat(msg.chat_id)).await;
        self.inner.message_exists(msg).await
    }

    async fn set_reaction(&self, msg: MessageRef, emoji: &str) -> Result<()> {
        self.wait_turn(Lane::Chat(msg.chat_id)).await;
        self.inner.set_reaction(msg, emoji).await
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        self.wait_turn(Lane::Chat(chat_id)).await;
        self.inner
            .send_inline_keyboard(chat_id, text, keyboard)
            .await
    }

    async fn edit_inline_keyboard(
        &self,
        msg: MessageRef,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<()> {
        self.wait_turn(Lane::Chat(msg.chat_id)).await;
        self.inner.edit_inline_keyboard(msg, text, keyboard).await
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.wait_turn(Lane::Global).await;
        self.inner.answer_callback_query(callback_id, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogs::testing::FakeMessenger;

    fn throttled(global_ms: u64, chat_ms: u64) -> ThrottledMessenger {
        ThrottledMessenger::new(
            Arc::new(FakeMessenger::default()),
            ThrottleConfig {
                global_min_interval: Duration::from_millis(global_ms),
                per_chat_min_interval: Duration::from_millis(chat_ms),
            },
        )
    }

    #[test]
    fn slots_are_spaced_by_the_interval() {
        let now = Instant::now();
        let mut slots = Slots::new(Duration::from_millis(500));
        slots.next = now;
        assert_eq!(slots.take(now), Duration::ZERO);
        assert_eq!(slots.take(now), Duration::from_millis(500));
        assert_eq!(slots.take(now), Duration::from_millis(1000));
        assert!(!slots.idle(now));
        assert!(slots.idle(now + Duration::from_millis(1500)));
    }

    #[tokio::test]
    async fn same_chat_waits_other_chats_do_not() {
        let m = throttled(0, 120);

        let start = Instant::now();
        m.send_html(ChatId(1), "a").await.unwrap();
        m.send_html(ChatId(2), "b").await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(100));

        m.send_html(ChatId(1), "c").await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(120));
    }

    #[tokio::test]
    async fn callback_answers_only_count_against_the_global_limit() {
        let m = throttled(0, 10_000);
        m.send_html(ChatId(1), "a").await.unwrap();

        let start = Instant::now();
        m.answer_callback_query("cb", None).await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(m.tracked_chats().await, 1);
    }

    #[tokio::test]
    async fn idle_chats_are_swept() {
        let m = throttled(0, 0);
        for i in 0..SWEEP_THRESHOLD as i64 {
            m.send_html(ChatId(i), "x").await.unwrap();
        }
        assert_eq!(m.tracked_chats().await, SWEEP_THRESHOLD);

        m.send_html(ChatId(-1), "x").await.unwrap();
        assert_eq!(m.tracked_chats().await, 1);
    }
}
