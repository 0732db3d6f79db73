//! Per-channel settings editor.
//!
//! `Idle -> AwaitingToggleChoice -> AwaitingToggleValue(key) -> AwaitingToggleChoice -> ... -> Closed`

use tokio::time::Instant;
use tracing::{info, warn};

use crate::{
    domain::{ChannelId, ChatId, MessageRef, UserId},
    errors::Error,
    formatting::escape_html,
    messaging::types::{truncate_label, InlineButton, InlineKeyboard},
    store::{ChannelConfig, ConfigStore, SettingKey, SETTINGS},
    Result,
};

use super::{callback_data, DialogAction, DialogContext, DialogEvent, DialogId, Step};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PanelState {
    Idle,
    AwaitingToggleChoice,
    AwaitingToggleValue(SettingKey),
    Closed,
}

/// Text above the menu: a hint, or a short-lived acknowledgement of the last write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placeholder {
    Idle,
    Ack(SettingKey, bool),
}

/// Work the driver has to do on behalf of the panel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PanelEffect {
    /// Persist the value, then call [`SettingsPanel::commit`].
    Write(SettingKey, bool),
    Close,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PanelExit {
    Closed,
    TimedOut,
}

#[derive(Clone, Debug)]
pub struct SettingsPanel {
    invoker: UserId,
    title: String,
    values: [bool; SETTINGS.len()],
    state: PanelState,
    placeholder: Placeholder,
}

fn slot(key: SettingKey) -> usize {
    SETTINGS.iter().position(|d| d.key == key).unwrap_or_default()
}

fn on_off(value: bool) -> &'static str {
    if value {
        "enabled"
    } else {
        "disabled"
    }
}

impl SettingsPanel {
    pub fn new(invoker: UserId, title: impl Into<String>, config: &ChannelConfig) -> Self {
        let mut values = [false; SETTINGS.len()];
        for (v, d) in values.iter_mut().zip(SETTINGS.iter()) {
            *v = config.setting(d.key);
        }
        Self {
            invoker,
            title: title.into(),
            values,
            state: PanelState::Idle,
            placeholder: Placeholder::Idle,
        }
    }

    pub fn state(&self) -> PanelState {
        self.state
    }

    pub fn placeholder(&self) -> Placeholder {
        self.placeholder
    }

    pub fn value(&self, key: SettingKey) -> bool {
        self.values[slot(key)]
    }

    /// Show the menu.
    pub fn open(&mut self) {
        if self.state == PanelState::Idle {
            self.state = PanelState::AwaitingToggleChoice;
        }
    }

    /// `Done` carries an effect; only [`PanelEffect::Close`] ends the panel.
    pub fn apply(&mut self, event: &DialogEvent) -> Step<PanelEffect> {
        if event.actor != self.invoker {
            return Step::Rejected;
        }
        match (self.state, &event.action) {
            (PanelState::Closed | PanelState::Idle, _) => Step::Ignored,
            (_, DialogAction::Close) => {
                self.state = PanelState::Closed;
                Step::Done(PanelEffect::Close)
            }
            (PanelState::AwaitingToggleChoice, DialogAction::Choose(name)) => {
                match name.parse::<SettingKey>() {
                    Ok(key) => {
                        self.state = PanelState::AwaitingToggleValue(key);
                        Step::Continue
                    }
                    Err(e) => {
                        warn!(error = %e, "settings panel got a foreign option");
                        Step::Ignored
                    }
                }
            }
            (PanelState::AwaitingToggleValue(key), DialogAction::Set(value)) => {
                Step::Done(PanelEffect::Write(key, *value))
            }
            (PanelState::AwaitingToggleValue(_), DialogAction::Cancel) => {
                self.state = PanelState::AwaitingToggleChoice;
                Step::Continue
            }
            _ => Step::Ignored,
        }
    }

    /// Record a persisted write: relabel the entry and acknowledge it.
    pub fn commit(&mut self, key: SettingKey, value: bool) {
        self.values[slot(key)] = value;
        self.placeholder = Placeholder::Ack(key, value);
        self.state = PanelState::AwaitingToggleChoice;
    }

    pub fn clear_ack(&mut self) {
        self.placeholder = Placeholder::Idle;
    }

    pub fn render(&self, id: DialogId, label_max: usize) -> (String, InlineKeyboard) {
        let header = format!("⚙️ <b>Suggestion settings for {}</b>", escape_html(&self.title));
        let close = || InlineButton::new("Close", callback_data(id, &DialogAction::Close));

        match self.state {
            PanelState::AwaitingToggleValue(key) => {
                let d = key.descriptor();
                let text = format!(
                    "{header}\n\n<b>{}</b> is currently {}.",
                    d.label,
                    on_off(self.value(key))
                );
                let kb = InlineKeyboard::new(vec![
                    vec![InlineButton::new(
                        truncate_label(d.enable_text, label_max),
                        callback_data(id, &DialogAction::Set(true)),
                    )],
                    vec![InlineButton::new(
                        truncate_label(d.disable_text, label_max),
                        callback_data(id, &DialogAction::Set(false)),
                    )],
                    vec![
                        InlineButton::new("Back", callback_data(id, &DialogAction::Cancel)),
                        close(),
                    ],
                ]);
                (text, kb)
            }
            _ => {
                let hint = match self.placeholder {
                    Placeholder::Idle => "Choose a setting to change.".to_string(),
                    Placeholder::Ack(key, value) => {
                        format!("✅ {} {}.", key.descriptor().label, on_off(value))
                    }
                };
                let mut kb = InlineKeyboard::one_per_row(
                    SETTINGS
                        .iter()
                        .map(|d| {
                            let icon = if self.value(d.key) { "✅" } else { "❌" };
                            InlineButton::new(
                                format!("{icon} {}", truncate_label(d.label, label_max)),
                                callback_data(id, &DialogAction::Choose(d.name.to_string())),
                            )
                        })
                        .collect(),
                );
                kb.push_row(vec![close()]);
                (format!("{header}\n\n{hint}"), kb)
            }
        }
    }
}

async fn redraw(ctx: &DialogContext, msg: MessageRef, panel: &SettingsPanel, id: DialogId) {
    let (text, kb) = panel.render(id, ctx.label_max);
    if let Err(e) = ctx.messenger.edit_inline_keyboard(msg, &text, kb).await {
        warn!(dialog = %id, error = %e, "failed to redraw settings panel");
    }
}

async fn finish(ctx: &DialogContext, msg: MessageRef, line: &str) {
    if let Err(e) = ctx.messenger.edit_html(msg, line).await {
        warn!(error = %e, "failed to close settings panel");
    }
}

/// Run the settings editor for `channel` until the invoker closes it or it times out.
///
/// The timeout window restarts after every accepted press.
pub async fn run_settings_panel(
    ctx: &DialogContext,
    configs: &ConfigStore,
    chat: ChatId,
    invoker: UserId,
    channel: ChannelId,
    title: &str,
) -> Result<PanelExit> {
    let config = configs
        .get(channel)
        .await?
        .ok_or(Error::NotConfigured(channel))?;

    let mut panel = SettingsPanel::new(invoker, title, &config);
    let mut session = ctx.hub.open(ctx.timeout);
    let id = session.id();
    panel.open();

    let (text, kb) = panel.render(id, ctx.label_max);
    let msg = ctx.messenger.send_inline_keyboard(chat, &text, kb).await?;

    let mut ack_until: Option<Instant> = None;
    let exit = loop {
        let event = tokio::select! {
            event = session.next_event() => event,
            _ = tokio::time::sleep_until(ack_until.unwrap_or_else(Instant::now)), if ack_until.is_some() => {
                ack_until = None;
                panel.clear_ack();
                redraw(ctx, msg, &panel, id).await;
                continue;
            }
        };
        let Some(event) = event else {
            break PanelExit::TimedOut;
        };

        let step = panel.apply(&event);
        ctx.acknowledge(&event, &step).await;
        match step {
            Step::Continue => {
                session.touch();
                redraw(ctx, msg, &panel, id).await;
            }
            Step::Done(PanelEffect::Write(key, value)) => {
                if let Err(e) = configs.set_field(channel, key, value).await {
                    finish(ctx, msg, "⚠️ Settings could not be saved.").await;
                    return Err(e);
                }
                info!(channel = %channel, setting = %key, value, "setting changed");
                panel.commit(key, value);
                ack_until = Some(Instant::now() + ctx.ack_interval);
                session.touch();
                redraw(ctx, msg, &panel, id).await;
            }
            Step::Done(PanelEffect::Close) => break PanelExit::Closed,
            Step::Rejected | Step::Ignored => {}
        }
    };
    drop(session);

    let line = match exit {
        PanelExit::Closed => "Settings closed.",
        PanelExit::TimedOut => "Settings panel timed out.",
    };
    finish(ctx, msg, line).await;
    Ok(exit)
}
