use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tracing::{info, warn};

use oxide_core::messaging::throttled::ThrottledMessenger;
use oxide_core::{
    config::Config,
    dialogs::{DialogContext, DialogHub},
    messaging::port::{DirectoryPort, MessagingPort},
    store::Database,
    suggestions::SuggestionService,
    utils::AuditLogger,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub service: SuggestionService,
    pub hub: Arc<DialogHub>,
    pub messenger: Arc<dyn MessagingPort>,
    pub directory: Arc<dyn DirectoryPort>,
    pub audit: Arc<AuditLogger>,
}

impl AppState {
    pub fn new(
        cfg: Arc<Config>,
        db: &Database,
        messenger: Arc<dyn MessagingPort>,
        directory: Arc<dyn DirectoryPort>,
    ) -> Self {
        let hub = DialogHub::new();
        let dialogs = DialogContext {
            hub: hub.clone(),
            messenger: messenger.clone(),
            timeout: cfg.dialog_timeout,
            ack_interval: cfg.settings_ack_interval,
            label_max: cfg.button_label_max_length,
        };
        let service =
            SuggestionService::new(db.stores(), messenger.clone(), directory.clone(), dialogs);
        let audit = Arc::new(AuditLogger::new(
            cfg.audit_log_path.clone(),
            cfg.audit_log_json,
        ));

        Self {
            cfg,
            service,
            hub,
            messenger,
            directory,
            audit,
        }
    }
}

pub async fn run_polling(cfg: Arc<Config>, db: Database) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.bot_token.clone());

    match bot.get_me().await {
        Ok(me) => info!(username = %me.username(), "oxide started"),
        Err(e) => warn!(error = %e, "failed to fetch bot identity"),
    }
    info!(
        database = %cfg.database_path.display(),
        dialog_timeout_secs = cfg.dialog_timeout.as_secs(),
        "configuration loaded"
    );

    // Outbound messages go through a throttling decorator to stay under flood limits.
    // The Telegram adapter still retries once on RetryAfter.
    let telegram = Arc::new(TelegramMessenger::new(bot.clone()));
    let raw_messenger: Arc<dyn MessagingPort> = telegram.clone();
    let messenger: Arc<dyn MessagingPort> =
        Arc::new(ThrottledMessenger::new(raw_messenger, cfg.throttle));
    let directory: Arc<dyn DirectoryPort> = telegram;

    let state = Arc::new(AppState::new(cfg, &db, messenger, directory));

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("oxide stopped");
    Ok(())
}
