//! Suggestion lifecycle: setup, admission, post, moderate, notify.

pub mod render;

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{
    dialogs::{
        confirmation::confirm,
        selection::{pick_channel, SelectionOutcome},
        settings::{run_settings_panel, PanelExit},
        DialogContext,
    },
    domain::{ChannelId, ChatId, GuildId, MessageRef, RoleId, SequenceId, UserId},
    errors::Error,
    formatting::escape_html,
    messaging::{
        port::{DirectoryPort, MessagingPort},
        types::CardContent,
    },
    store::{
        BlacklistEntry, ChannelConfig, NewSuggestion, SettingKey, Stores, Suggestion,
        SuggestionStatus,
    },
    Result,
};

use render::{CardView, DOWNVOTE, UPVOTE};

/// Where a command came from and who issued it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub guild: GuildId,
    pub chat: ChatId,
    pub user: UserId,
}

/// Result of an operation that may need the invoker to pick a channel or confirm.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolved<T> {
    Done(T),
    Canceled,
    TimedOut,
    NothingConfigured,
}

#[derive(Clone, Debug)]
pub struct PostRequest {
    pub guild: GuildId,
    pub channel: ChannelId,
    /// Chat the review prompt is shown in.
    pub chat: ChatId,
    pub author: UserId,
    pub author_name: String,
    pub content: Option<String>,
    /// Platform reference to an uploaded file.
    pub attachment: Option<String>,
    pub anonymous: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PostOutcome {
    Posted {
        sequence_id: SequenceId,
        acknowledged_privately: bool,
    },
    /// The author declined at review.
    Withdrawn,
    TimedOut,
}

#[derive(Clone, Debug)]
pub struct ModerationRequest {
    pub guild: GuildId,
    pub sequence_id: SequenceId,
    pub status: SuggestionStatus,
    pub note: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NoticeDelivery {
    Disabled,
    Delivered,
    Undelivered(String),
}

#[derive(Clone, Debug)]
pub struct ModerationReport {
    pub suggestion: Suggestion,
    pub notice: NoticeDelivery,
    /// `false` when the status was saved but the rendered card could not be updated.
    pub card_updated: bool,
}

pub const REMOVE_PROMPT: &str =
    "⚠️ This will reset any suggestions setup in this channel, are you sure to proceed?";

/// Orchestrates the stores, dialogs and messenger for every suggestion command.
#[derive(Clone)]
pub struct SuggestionService {
    stores: Stores,
    messenger: Arc<dyn MessagingPort>,
    directory: Arc<dyn DirectoryPort>,
    dialogs: DialogContext,
}

impl SuggestionService {
    pub fn new(
        stores: Stores,
        messenger: Arc<dyn MessagingPort>,
        directory: Arc<dyn DirectoryPort>,
        dialogs: DialogContext,
    ) -> Self {
        Self {
            stores,
            messenger,
            directory,
            dialogs,
        }
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    async fn channel_title(&self, channel: ChannelId) -> String {
        match self.directory.channel_title(channel).await {
            Ok(Some(title)) => title,
            Ok(None) => channel.to_string(),
            Err(e) => {
                debug!(channel = %channel, error = %e, "channel title lookup failed");
                channel.to_string()
            }
        }
    }

    async fn config_in_guild(&self, guild: GuildId, channel: ChannelId) -> Result<ChannelConfig> {
        self.stores
            .configs
            .get_in_guild(guild, channel)
            .await?
            .ok_or(Error::NotConfigured(channel))
    }

    async fn edit_best_effort(&self, msg: MessageRef, html: &str) {
        if let Err(e) = self.messenger.edit_html(msg, html).await {
            warn!(error = %e, "failed to update prompt");
        }
    }

    // ============== Setup ==============

    pub async fn setup(&self, guild: GuildId, channel: ChannelId) -> Result<ChannelConfig> {
        let config = self.stores.configs.create(guild, channel).await?;
        info!(guild = %guild, channel = %channel, "suggestions configured");
        Ok(config)
    }

    /// Resolve the channel a command targets: the explicit one (must belong to the
    /// guild), or a pick among the guild's configured channels.
    pub async fn resolve_channel(
        &self,
        inv: Invocation,
        explicit: Option<ChannelId>,
        prompt: &str,
    ) -> Result<Resolved<ChannelId>> {
        if let Some(channel) = explicit {
            self.config_in_guild(inv.guild, channel).await?;
            return Ok(Resolved::Done(channel));
        }

        let configured = self.stores.configs.list_channels(inv.guild).await?;
        let picked = pick_channel(
            &self.dialogs,
            self.directory.as_ref(),
            inv.chat,
            inv.user,
            prompt,
            &configured,
        )
        .await?;

        Ok(match picked {
            None => Resolved::NothingConfigured,
            Some(SelectionOutcome::Selected(channel)) => Resolved::Done(channel),
            Some(SelectionOutcome::Canceled) => Resolved::Canceled,
            Some(SelectionOutcome::TimedOut) => Resolved::TimedOut,
        })
    }

    pub async fn remove_setup(
        &self,
        inv: Invocation,
        channel: Option<ChannelId>,
    ) -> Result<Resolved<ChannelId>> {
        let channel = match self
            .resolve_channel(inv, channel, "Which channel should stop taking suggestions?")
            .await?
        {
            Resolved::Done(channel) => channel,
            Resolved::Canceled => return Ok(Resolved::Canceled),
            Resolved::TimedOut => return Ok(Resolved::TimedOut),
            Resolved::NothingConfigured => return Ok(Resolved::NothingConfigured),
        };

        let answer = confirm(&self.dialogs, inv.chat, inv.user, REMOVE_PROMPT).await?;
        match answer.answer {
            None => return Ok(Resolved::TimedOut),
            Some(false) => return Ok(Resolved::Canceled),
            Some(true) => {}
        }

        let removed = self.stores.configs.delete(inv.guild, channel).await?;
        let title = self.channel_title(channel).await;
        if !removed {
            // Deleted by someone else while the prompt was open.
            self.edit_best_effort(answer.message, "Nothing to remove.")
                .await;
            return Err(Error::NotConfigured(channel));
        }
        info!(guild = %inv.guild, channel = %channel, "suggestion setup removed");
        self.edit_best_effort(
            answer.message,
            &format!(
                "✅ Removed suggestion setup for <b>{}</b>.",
                escape_html(&title)
            ),
        )
        .await;
        Ok(Resolved::Done(channel))
    }

    // ============== Settings ==============

    pub async fn list_settings(&self, guild: GuildId, channel: ChannelId) -> Result<ChannelConfig> {
        self.config_in_guild(guild, channel).await
    }

    pub async fn settings_summary(&self, guild: GuildId, channel: ChannelId) -> Result<String> {
        let config = self.list_settings(guild, channel).await?;
        let title = self.channel_title(channel).await;
        Ok(render::settings_summary(&config, &title))
    }

    pub async fn toggle_setting(
        &self,
        guild: GuildId,
        channel: ChannelId,
        key: SettingKey,
        value: bool,
    ) -> Result<ChannelConfig> {
        self.config_in_guild(guild, channel).await?;
        self.stores.configs.set_field(channel, key, value).await?;
        info!(channel = %channel, setting = %key, value, "setting changed");
        self.config_in_guild(guild, channel).await
    }

    pub async fn open_settings(
        &self,
        inv: Invocation,
        channel: Option<ChannelId>,
    ) -> Result<Resolved<PanelExit>> {
        let channel = match self
            .resolve_channel(inv, channel, "Which channel's settings do you want to change?")
            .await?
        {
            Resolved::Done(channel) => channel,
            Resolved::Canceled => return Ok(Resolved::Canceled),
            Resolved::TimedOut => return Ok(Resolved::TimedOut),
            Resolved::NothingConfigured => return Ok(Resolved::NothingConfigured),
        };
        let title = self.channel_title(channel).await;
        let exit = run_settings_panel(
            &self.dialogs,
            &self.stores.configs,
            inv.chat,
            inv.user,
            channel,
            &title,
        )
        .await?;
        Ok(Resolved::Done(exit))
    }

    /// Set the role required to post, or with `None` just report the current one.
    pub async fn restrict(
        &self,
        guild: GuildId,
        channel: ChannelId,
        role: Option<RoleId>,
    ) -> Result<Option<RoleId>> {
        let config = self.config_in_guild(guild, channel).await?;
        let Some(role) = role else {
            return Ok(config.restricted_role_id);
        };
        self.stores
            .configs
            .set_restriction(channel, Some(role))
            .await?;
        info!(channel = %channel, role = %role, "posting restricted");
        Ok(Some(role))
    }

    pub async fn unrestrict(&self, guild: GuildId, channel: ChannelId) -> Result<()> {
        self.config_in_guild(guild, channel).await?;
        self.stores.configs.set_restriction(channel, None).await?;
        info!(channel = %channel, "posting restriction cleared");
        Ok(())
    }

    // ============== Blacklist ==============

    pub async fn blacklist_add(
        &self,
        guild: GuildId,
        channel: ChannelId,
        user: UserId,
        reason: Option<&str>,
    ) -> Result<BlacklistEntry> {
        self.config_in_guild(guild, channel).await?;
        let entry = self
            .stores
            .blacklist
            .upsert(guild, channel, user, reason)
            .await?;
        info!(channel = %channel, user = %user, "user blacklisted");
        Ok(entry)
    }

    pub async fn blacklist_remove(
        &self,
        guild: GuildId,
        channel: ChannelId,
        user: UserId,
    ) -> Result<bool> {
        self.config_in_guild(guild, channel).await?;
        let existed = self.stores.blacklist.remove(channel, user).await?;
        info!(channel = %channel, user = %user, existed, "user unblacklisted");
        Ok(existed)
    }

    // ============== Posting ==============

    /// Admission checks, in order. Nothing is written.
    async fn admit(&self, req: &PostRequest) -> Result<ChannelConfig> {
        if let Some(entry) = self.stores.blacklist.check(req.channel, req.author).await? {
            return Err(Error::Blacklisted {
                reason: entry.reason,
            });
        }
        let config = self.config_in_guild(req.guild, req.channel).await?;
        if !config.enabled {
            return Err(Error::ChannelDisabled);
        }
        if let Some(role) = config.restricted_role_id {
            if !self.directory.has_role(req.guild, req.author, role).await? {
                return Err(Error::RoleRequired(role));
            }
        }
        if req.attachment.is_some() && !config.allow_attachments {
            return Err(Error::AttachmentsDisallowed);
        }
        if req.anonymous && !config.allow_anonymous {
            return Err(Error::AnonymousDisallowed);
        }
        Ok(config)
    }

    /// Reject text the platform would refuse to render, so the author isn't told to retry.
    /// Both the review prompt and the card (a caption when there is an attachment) must fit.
    fn check_length(&self, req: &PostRequest, card: &CardContent, prompt: &str) -> Result<()> {
        let caps = self.messenger.capabilities();
        let card_limit = if card.attachment.is_some() {
            caps.max_caption_len
        } else {
            caps.max_message_len
        };
        let excess = card
            .html
            .chars()
            .count()
            .saturating_sub(card_limit)
            .max(prompt.chars().count().saturating_sub(caps.max_message_len));
        if excess == 0 {
            return Ok(());
        }

        let content_len = req.content.as_deref().map_or(0, |c| c.chars().count());
        debug!(channel = %req.channel, excess, "suggestion too long to render");
        Err(Error::SuggestionTooLong {
            max: content_len.saturating_sub(excess),
        })
    }

    /// Delete a card whose record could not be saved.
    async fn retract(&self, msg: MessageRef) {
        if let Err(e) = self.messenger.delete_message(msg).await {
            warn!(error = %e, "failed to delete orphaned suggestion card");
        }
    }

    pub async fn post(&self, mut req: PostRequest) -> Result<PostOutcome> {
        req.content = req
            .content
            .take()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
        if req.content.is_none() && req.attachment.is_none() {
            return Err(Error::EmptySuggestion);
        }

        self.admit(&req).await?;

        let title = self.channel_title(req.channel).await;
        // The number is assigned only once the author confirms.
        let preview = render::card(&CardView {
            sequence_id: None,
            author: req.author,
            author_name: &req.author_name,
            anonymous: req.anonymous,
            content: req.content.as_deref(),
            attachment: req.attachment.as_deref(),
            status: SuggestionStatus::Pending,
            note: None,
        });
        let prompt = format!(
            "Post this suggestion to <b>{}</b>?\n\n{}",
            escape_html(&title),
            preview.html
        );
        self.check_length(&req, &preview, &prompt)?;

        let review = confirm(&self.dialogs, req.chat, req.author, &prompt).await?;
        match review.answer {
            None => return Ok(PostOutcome::TimedOut),
            Some(false) => return Ok(PostOutcome::Withdrawn),
            Some(true) => {}
        }

        // Settings may have changed while the review was open.
        if let Err(e) = self.admit(&req).await {
            self.edit_best_effort(review.message, "Suggestion was not posted.")
                .await;
            return Err(e);
        }

        let reservation = self.stores.suggestions.reserve(req.guild).await?;
        let sequence_id = reservation.sequence_id();
        let card = render::card(&CardView {
            sequence_id: Some(sequence_id),
            author: req.author,
            author_name: &req.author_name,
            anonymous: req.anonymous,
            content: req.content.as_deref(),
            attachment: req.attachment.as_deref(),
            status: SuggestionStatus::Pending,
            note: None,
        });

        let msg = match self.messenger.send_card(req.channel.into(), &card).await {
            Ok(msg) => msg,
            Err(e) => {
                warn!(channel = %req.channel, error = %e, "failed to render suggestion");
                self.edit_best_effort(review.message, "Suggestion was not posted.")
                    .await;
                return Err(Error::RenderFailed(e.to_string()));
            }
        };

        if self.messenger.capabilities().supports_reactions {
            for emoji in [UPVOTE, DOWNVOTE] {
                if let Err(e) = self.messenger.set_reaction(msg, emoji).await {
                    warn!(channel = %req.channel, error = %e, "failed to add vote reaction");
                    self.retract(msg).await;
                    return Err(Error::RenderFailed(e.to_string()));
                }
            }
        }

        let new = NewSuggestion {
            channel_id: req.channel,
            author_id: req.author,
            message: msg,
            content: req.content.clone(),
            attachment_url: req.attachment.clone(),
            anonymous: req.anonymous,
            created_at: Utc::now(),
        };
        let suggestion = match self.stores.suggestions.insert(reservation, new).await {
            Ok(s) => s,
            Err(e) => {
                self.retract(msg).await;
                return Err(e);
            }
        };
        info!(
            guild = %req.guild,
            channel = %req.channel,
            sequence_id,
            anonymous = req.anonymous,
            "suggestion posted"
        );

        let mut acknowledged_privately = false;
        if req.anonymous {
            self.edit_best_effort(review.message, "✅ Suggestion posted.")
                .await;
            let ack = format!(
                "✅ Your anonymous suggestion #{} was posted in <b>{}</b>.",
                suggestion.sequence_id,
                escape_html(&title)
            );
            match self.messenger.send_direct(req.author, &ack).await {
                Ok(_) => acknowledged_privately = true,
                Err(e) => warn!(user = %req.author, error = %e, "failed to acknowledge anonymous post"),
            }
        } else {
            self.edit_best_effort(
                review.message,
                &format!(
                    "✅ Posted suggestion #{} in <b>{}</b>.",
                    suggestion.sequence_id,
                    escape_html(&title)
                ),
            )
            .await;
        }

        Ok(PostOutcome::Posted {
            sequence_id: suggestion.sequence_id,
            acknowledged_privately,
        })
    }

    // ============== Moderation ==============

    pub async fn moderate(&self, req: ModerationRequest) -> Result<ModerationReport> {
        let id = req.sequence_id;
        let current = self
            .stores
            .suggestions
            .get(req.guild, id)
            .await?
            .ok_or(Error::NotFound(id))?;
        if current.status.is_terminal() {
            return Err(Error::AlreadyResolved {
                sequence_id: id,
                status: current.status,
            });
        }
        if !self.messenger.message_exists(current.message).await? {
            warn!(guild = %req.guild, sequence_id = id, "suggestion card is gone");
            return Err(Error::RenderedMessageMissing(id));
        }

        let note = req.note.as_deref().map(str::trim).filter(|n| !n.is_empty());
        let updated = self
            .stores
            .suggestions
            .transition(req.guild, id, req.status, note, Utc::now())
            .await?;
        info!(guild = %req.guild, sequence_id = id, status = %updated.status, "suggestion moderated");

        let author_name = match self.directory.display_name(req.guild, updated.author_id).await {
            Ok(Some(name)) => name,
            Ok(None) => "Unknown user".to_string(),
            Err(e) => {
                debug!(error = %e, "author lookup failed");
                "Unknown user".to_string()
            }
        };
        let card = render::card(&CardView::of(&updated, &author_name));
        let card_updated = match self.messenger.edit_card(updated.message, &card).await {
            Ok(()) => true,
            Err(e) => {
                warn!(sequence_id = id, error = %e, "failed to update suggestion card");
                false
            }
        };

        let notify = self
            .stores
            .configs
            .get(updated.channel_id)
            .await?
            .map(|c| c.action_notification_enabled)
            .unwrap_or(false);
        let notice = if notify {
            let title = self.channel_title(updated.channel_id).await;
            let html = render::author_notice(&updated, &title);
            match self.messenger.send_direct(updated.author_id, &html).await {
                Ok(_) => NoticeDelivery::Delivered,
                Err(e) => {
                    warn!(user = %updated.author_id, error = %e, "failed to notify author");
                    NoticeDelivery::Undelivered(e.to_string())
                }
            }
        } else {
            NoticeDelivery::Disabled
        };

        Ok(ModerationReport {
            suggestion: updated,
            notice,
            card_updated,
        })
    }
}
