use std::sync::Arc;

use teloxide::prelude::*;
use tracing::{debug, info, warn};

use oxide_core::{
    domain::{ChannelId, ChatId, GuildId, MessageId, MessageRef, RoleId, SequenceId, UserId},
    errors::{Error, ErrorKind},
    formatting::escape_html,
    store::{SettingKey, SuggestionStatus},
    suggestions::{
        Invocation, ModerationRequest, NoticeDelivery, PostOutcome, PostRequest, Resolved,
    },
    utils::AuditEvent,
    Result,
};

use crate::router::AppState;

const HELP: &str = "💡 <b>Suggestions</b>\n\n\
<b>Everyone</b>\n\
/suggest &lt;text&gt; - Submit a suggestion (send a photo with this caption to attach it)\n\
/anonsuggest &lt;text&gt; - Submit without your name\n\n\
<b>Administrators</b>\n\
/setup &lt;channel&gt; - Start taking suggestions in a channel\n\
/removesetup [channel] - Stop taking suggestions\n\
/settings [channel] - Open the settings panel\n\
/showsettings [channel] - Show the current settings\n\
/toggle &lt;setting&gt; &lt;on|off&gt; [channel] - Change one setting\n\
/restrict [role] [channel] - Only let members of a role chat post\n\
/unrestrict [channel] - Let anyone post\n\
/accept, /decline, /consider &lt;id&gt; [note] - Resolve a suggestion\n\
/blacklist &lt;user&gt; [channel] [reason] - Stop a user from posting (or reply to them)\n\
/unblacklist &lt;user&gt; [channel] - Let a user post again";

const SETUP_USAGE: &str = "Usage: /setup &lt;channel id&gt;";
const TOGGLE_USAGE: &str = "Usage: /toggle &lt;setting&gt; &lt;on|off&gt; [channel]\n\
Settings: allow_anonymous, action_notification_enabled, allow_attachments, allow_edits, enabled";
const RESTRICT_USAGE: &str = "Usage: /restrict [role chat id] [channel]";
const CHANNEL_USAGE: &str = "Usage: /{cmd} [channel id]";
const MODERATE_USAGE: &str = "Usage: /{cmd} &lt;suggestion id&gt; [note]";
const BLACKLIST_USAGE: &str = "Usage: /{cmd} &lt;user id&gt; [channel] [reason], or reply to the user";

const GROUP_ONLY: &str = "This command only works in group chats.";
const ADMIN_ONLY: &str = "❌ Only chat administrators can use this command.";
const NOTHING_CONFIGURED: &str =
    "No channels take suggestions here yet. An administrator can run /setup first.";

#[derive(Clone, Debug, PartialEq, Eq)]
enum Command {
    Help,
    Setup {
        channel: ChannelId,
    },
    RemoveSetup {
        channel: Option<ChannelId>,
    },
    Settings {
        channel: Option<ChannelId>,
    },
    ShowSettings {
        channel: Option<ChannelId>,
    },
    Toggle {
        key: SettingKey,
        value: bool,
        channel: Option<ChannelId>,
    },
    Restrict {
        role: Option<RoleId>,
        channel: Option<ChannelId>,
    },
    Unrestrict {
        channel: Option<ChannelId>,
    },
    Suggest {
        anonymous: bool,
        content: Option<String>,
    },
    Moderate {
        status: SuggestionStatus,
        sequence_id: SequenceId,
        note: Option<String>,
    },
    Blacklist {
        target: UserId,
        channel: Option<ChannelId>,
        reason: Option<String>,
    },
    Unblacklist {
        target: UserId,
        channel: Option<ChannelId>,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Help => "help",
            Command::Setup { .. } => "setup",
            Command::RemoveSetup { .. } => "removesetup",
            Command::Settings { .. } => "settings",
            Command::ShowSettings { .. } => "showsettings",
            Command::Toggle { .. } => "toggle",
            Command::Restrict { .. } => "restrict",
            Command::Unrestrict { .. } => "unrestrict",
            Command::Suggest { .. } => "suggest",
            Command::Moderate { .. } => "moderate",
            Command::Blacklist { .. } => "blacklist",
            Command::Unblacklist { .. } => "unblacklist",
        }
    }

    fn needs_admin(&self) -> bool {
        !matches!(self, Command::Help | Command::Suggest { .. })
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Parsed {
    Command(Command),
    Usage(String),
    /// Not one of ours (other bots share the group).
    Unknown,
}

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

fn split_first(s: &str) -> (&str, &str) {
    let s = s.trim();
    match s.split_once(char::is_whitespace) {
        Some((head, tail)) => (head, tail.trim()),
        None => (s, ""),
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn parse_channel(s: &str) -> Option<ChannelId> {
    s.parse::<i64>().ok().map(ChannelId)
}

/// Zero or one channel argument; anything else is a usage error.
fn optional_channel(args: &[&str]) -> Option<Option<ChannelId>> {
    match args {
        [] => Some(None),
        [c] => parse_channel(c).map(Some),
        _ => None,
    }
}

/// Chat ids of groups and channels are negative, which keeps them apart from user ids and reasons.
fn take_channel(s: &str) -> (Option<ChannelId>, &str) {
    let (head, tail) = split_first(s);
    if head.starts_with('-') {
        if let Some(channel) = parse_channel(head) {
            return (Some(channel), tail);
        }
    }
    (None, s.trim())
}

/// An explicit positive user id wins over the author of the replied-to message.
fn take_target(s: &str, reply_author: Option<UserId>) -> Option<(UserId, &str)> {
    let (head, tail) = split_first(s);
    match head.parse::<i64>() {
        Ok(id) if id > 0 => Some((UserId(id), tail)),
        _ => reply_author.map(|u| (u, s.trim())),
    }
}

fn parse_switch(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "on" | "true" | "yes" | "1" | "enable" => Some(true),
        "off" | "false" | "no" | "0" | "disable" => Some(false),
        _ => None,
    }
}

fn parse(text: &str, reply_author: Option<UserId>) -> Parsed {
    let (cmd, rest) = parse_command(text);
    let args: Vec<&str> = rest.split_whitespace().collect();
    let usage = |template: &str| Parsed::Usage(template.replace("{cmd}", &cmd));

    let command = match cmd.as_str() {
        "start" | "help" => Command::Help,
        "setup" => match args.as_slice() {
            [c] => match parse_channel(c) {
                Some(channel) => Command::Setup { channel },
                None => return usage(SETUP_USAGE),
            },
            _ => return usage(SETUP_USAGE),
        },
        "removesetup" | "settings" | "showsettings" | "unrestrict" => {
            let Some(channel) = optional_channel(&args) else {
                return usage(CHANNEL_USAGE);
            };
            match cmd.as_str() {
                "removesetup" => Command::RemoveSetup { channel },
                "settings" => Command::Settings { channel },
                "showsettings" => Command::ShowSettings { channel },
                _ => Command::Unrestrict { channel },
            }
        }
        "toggle" => {
            let (key, value, channel) = match args.as_slice() {
                [k, v] => (k, v, None),
                [k, v, c] => match parse_channel(c) {
                    Some(channel) => (k, v, Some(channel)),
                    None => return usage(TOGGLE_USAGE),
                },
                _ => return usage(TOGGLE_USAGE),
            };
            match (key.parse::<SettingKey>(), parse_switch(value)) {
                (Ok(key), Some(value)) => Command::Toggle {
                    key,
                    value,
                    channel,
                },
                _ => return usage(TOGGLE_USAGE),
            }
        }
        "restrict" => {
            let ids: Option<Vec<i64>> = args.iter().map(|a| a.parse().ok()).collect();
            match ids.as_deref() {
                Some([]) => Command::Restrict {
                    role: None,
                    channel: None,
                },
                Some([r]) => Command::Restrict {
                    role: Some(RoleId(*r)),
                    channel: None,
                },
                Some([r, c]) => Command::Restrict {
                    role: Some(RoleId(*r)),
                    channel: Some(ChannelId(*c)),
                },
                _ => return usage(RESTRICT_USAGE),
            }
        }
        "suggest" | "anonsuggest" => Command::Suggest {
            anonymous: cmd == "anonsuggest",
            content: non_empty(&rest),
        },
        "accept" | "decline" | "consider" => {
            let status = match cmd.as_str() {
                "accept" => SuggestionStatus::Accepted,
                "decline" => SuggestionStatus::Declined,
                _ => SuggestionStatus::Considered,
            };
            let (id, note) = split_first(&rest);
            match id.trim_start_matches('#').parse::<SequenceId>() {
                Ok(sequence_id) if sequence_id > 0 => Command::Moderate {
                    status,
                    sequence_id,
                    note: non_empty(note),
                },
                _ => return usage(MODERATE_USAGE),
            }
        }
        "blacklist" | "unblacklist" => {
            let Some((target, tail)) = take_target(&rest, reply_author) else {
                return usage(BLACKLIST_USAGE);
            };
            let (channel, reason) = take_channel(tail);
            if cmd == "blacklist" {
                Command::Blacklist {
                    target,
                    channel,
                    reason: non_empty(reason),
                }
            } else {
                Command::Unblacklist { target, channel }
            }
        }
        _ => return Parsed::Unknown,
    };
    Parsed::Command(command)
}

/// Everything a spawned command needs from the originating message.
struct CommandContext {
    inv: Invocation,
    username: String,
    full_name: String,
    message: MessageRef,
    attachment: Option<String>,
}

async fn say(state: &AppState, chat: ChatId, html: &str) {
    if let Err(e) = state.messenger.send_html(chat, html).await {
        warn!(chat = %chat, error = %e, "failed to send reply");
    }
}

async fn title(state: &AppState, channel: ChannelId) -> String {
    match state.directory.channel_title(channel).await {
        Ok(Some(t)) => escape_html(&t),
        _ => channel.to_string(),
    }
}

/// Resolve the target channel, telling the user when there is nothing to pick from.
/// Cancel and timeout are already shown on the selection prompt.
async fn resolve(
    state: &AppState,
    ctx: &CommandContext,
    explicit: Option<ChannelId>,
    prompt: &str,
) -> Result<Option<ChannelId>> {
    match state.service.resolve_channel(ctx.inv, explicit, prompt).await? {
        Resolved::Done(channel) => Ok(Some(channel)),
        Resolved::NothingConfigured => {
            say(state, ctx.inv.chat, NOTHING_CONFIGURED).await;
            Ok(None)
        }
        Resolved::Canceled | Resolved::TimedOut => Ok(None),
    }
}

pub async fn handle_command(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let text = msg.text().or(msg.caption()).unwrap_or_default();
    let reply_author = msg
        .reply_to_message()
        .and_then(|m| m.from())
        .map(|u| UserId(u.id.0 as i64));

    let chat = ChatId(msg.chat.id.0);
    let command = match parse(text, reply_author) {
        Parsed::Unknown => return Ok(()),
        Parsed::Usage(usage) => {
            say(&state, chat, &usage).await;
            return Ok(());
        }
        Parsed::Command(c) => c,
    };

    if command != Command::Help && !(msg.chat.is_group() || msg.chat.is_supergroup()) {
        say(&state, chat, GROUP_ONLY).await;
        return Ok(());
    }

    let ctx = CommandContext {
        inv: Invocation {
            guild: GuildId(msg.chat.id.0),
            chat,
            user: UserId(user.id.0 as i64),
        },
        username: user
            .username
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        full_name: user.full_name(),
        message: MessageRef {
            chat_id: chat,
            message_id: MessageId(msg.id.0),
        },
        // Largest size is last.
        attachment: msg
            .photo()
            .and_then(|sizes| sizes.last())
            .map(|p| p.file.id.clone()),
    };

    debug!(command = command.name(), user = %ctx.inv.user, chat = %chat, "command received");

    // Dialogs wait for button presses from this same chat; never block the dispatcher on them.
    tokio::spawn(async move {
        let name = command.name();
        if let Err(e) = execute(&state, &ctx, command).await {
            report(&state, &ctx, name, &e).await;
        }
    });
    Ok(())
}

/// Only a published anonymous post takes the author's command message with it;
/// a rejected or withdrawn one leaves the text for the author to fix.
fn hides_command_message(anonymous: bool, outcome: &PostOutcome) -> bool {
    anonymous && matches!(outcome, PostOutcome::Posted { .. })
}

async fn report(state: &AppState, ctx: &CommandContext, command: &str, e: &Error) {
    match e.kind() {
        ErrorKind::UserInput => debug!(command, error = %e, "command rejected"),
        _ => warn!(command, error = %e, "command failed"),
    }
    state.audit.record(AuditEvent::error(
        ctx.inv.user,
        &ctx.username,
        &e.to_string(),
        Some(command),
    ));
    say(state, ctx.inv.chat, &escape_html(&e.user_message())).await;
}

async fn execute(state: &AppState, ctx: &CommandContext, command: Command) -> Result<()> {
    let inv = ctx.inv;
    if command.needs_admin() && !state.directory.can_manage(inv.guild, inv.user).await? {
        say(state, inv.chat, ADMIN_ONLY).await;
        return Ok(());
    }

    match command {
        Command::Help => say(state, inv.chat, HELP).await,

        Command::Setup { channel } => {
            if state.directory.channel_title(channel).await?.is_none() {
                say(
                    state,
                    inv.chat,
                    "❌ I can't reach that channel. Add me to it first.",
                )
                .await;
                return Ok(());
            }
            state.service.setup(inv.guild, channel).await?;
            state.audit.record(AuditEvent::setup(
                inv.user,
                &ctx.username,
                inv.guild,
                channel,
                "setup",
            ));
            let html = format!(
                "✅ Suggestions are now taken in <b>{}</b>. Use /settings to adjust them.",
                title(state, channel).await
            );
            say(state, inv.chat, &html).await;
        }

        Command::RemoveSetup { channel } => match state.service.remove_setup(inv, channel).await? {
            Resolved::Done(channel) => state.audit.record(AuditEvent::setup(
                inv.user,
                &ctx.username,
                inv.guild,
                channel,
                "remove_setup",
            )),
            Resolved::NothingConfigured => say(state, inv.chat, NOTHING_CONFIGURED).await,
            Resolved::Canceled | Resolved::TimedOut => {}
        },

        Command::Settings { channel } => {
            if let Resolved::NothingConfigured = state.service.open_settings(inv, channel).await? {
                say(state, inv.chat, NOTHING_CONFIGURED).await;
            }
        }

        Command::ShowSettings { channel } => {
            let Some(channel) =
                resolve(state, ctx, channel, "Which channel's settings should I show?").await?
            else {
                return Ok(());
            };
            let html = state.service.settings_summary(inv.guild, channel).await?;
            say(state, inv.chat, &html).await;
        }

        Command::Toggle {
            key,
            value,
            channel,
        } => {
            let Some(channel) =
                resolve(state, ctx, channel, "Which channel's setting should change?").await?
            else {
                return Ok(());
            };
            state
                .service
                .toggle_setting(inv.guild, channel, key, value)
                .await?;
            state.audit.record(AuditEvent::setup(
                inv.user,
                &ctx.username,
                inv.guild,
                channel,
                &format!("{key}={value}"),
            ));
            let html = format!(
                "✅ {} is now {} in <b>{}</b>.",
                key.descriptor().label,
                if value { "on" } else { "off" },
                title(state, channel).await
            );
            say(state, inv.chat, &html).await;
        }

        Command::Restrict { role, channel } => {
            let Some(channel) =
                resolve(state, ctx, channel, "Which channel should be restricted?").await?
            else {
                return Ok(());
            };
            let changed = role.is_some();
            let current = state.service.restrict(inv.guild, channel, role).await?;
            if changed {
                state.audit.record(AuditEvent::setup(
                    inv.user,
                    &ctx.username,
                    inv.guild,
                    channel,
                    "restrict",
                ));
            }
            let name = title(state, channel).await;
            let html = match current {
                Some(role) if changed => format!(
                    "🔒 Only members of <code>{role}</code> can now post in <b>{name}</b>."
                ),
                Some(role) => format!(
                    "🔒 Posting in <b>{name}</b> is restricted to members of <code>{role}</code>."
                ),
                None => format!("🔓 Anyone can post in <b>{name}</b>."),
            };
            say(state, inv.chat, &html).await;
        }

        Command::Unrestrict { channel } => {
            let Some(channel) =
                resolve(state, ctx, channel, "Which channel should be opened to everyone?").await?
            else {
                return Ok(());
            };
            state.service.unrestrict(inv.guild, channel).await?;
            state.audit.record(AuditEvent::setup(
                inv.user,
                &ctx.username,
                inv.guild,
                channel,
                "unrestrict",
            ));
            let html = format!("🔓 Anyone can post in <b>{}</b>.", title(state, channel).await);
            say(state, inv.chat, &html).await;
        }

        Command::Suggest { anonymous, content } => {
            let Some(channel) =
                resolve(state, ctx, None, "Which channel is your suggestion for?").await?
            else {
                return Ok(());
            };
            let req = PostRequest {
                guild: inv.guild,
                channel,
                chat: inv.chat,
                author: inv.user,
                author_name: ctx.full_name.clone(),
                content,
                attachment: ctx.attachment.clone(),
                anonymous,
            };
            let content = req.content.clone();
            let outcome = state.service.post(req).await?;
            if hides_command_message(anonymous, &outcome) {
                // Keep the author's name out of the chat history.
                if let Err(e) = state.messenger.delete_message(ctx.message).await {
                    debug!(error = %e, "could not delete anonymous command message");
                }
            }
            match outcome {
                PostOutcome::Posted {
                    sequence_id,
                    acknowledged_privately,
                } => {
                    state.audit.record(AuditEvent::post(
                        inv.user,
                        &ctx.username,
                        inv.guild,
                        channel,
                        sequence_id,
                        content.as_deref(),
                        anonymous,
                    ));
                    if anonymous && !acknowledged_privately {
                        info!(user = %inv.user, sequence_id, "anonymous author has no private chat with the bot");
                    }
                }
                PostOutcome::Withdrawn | PostOutcome::TimedOut => {}
            }
        }

        Command::Moderate {
            status,
            sequence_id,
            note,
        } => {
            let report = state
                .service
                .moderate(ModerationRequest {
                    guild: inv.guild,
                    sequence_id,
                    status,
                    note: note.clone(),
                })
                .await?;
            state.audit.record(AuditEvent::moderation(
                inv.user,
                &ctx.username,
                inv.guild,
                sequence_id,
                status,
                note.as_deref(),
            ));
            let mut html = format!("✅ Suggestion #{sequence_id} marked <b>{status}</b>.");
            if !report.card_updated {
                html.push_str("\n⚠️ The suggestion message could not be updated.");
            }
            match report.notice {
                NoticeDelivery::Delivered => html.push_str("\nThe author was notified."),
                NoticeDelivery::Undelivered(_) => {
                    html.push_str("\n⚠️ The author could not be notified.")
                }
                NoticeDelivery::Disabled => {}
            }
            say(state, inv.chat, &html).await;
        }

        Command::Blacklist {
            target,
            channel,
            reason,
        } => {
            let Some(channel) =
                resolve(state, ctx, channel, "Which channel should the user be blocked from?")
                    .await?
            else {
                return Ok(());
            };
            state
                .service
                .blacklist_add(inv.guild, channel, target, reason.as_deref())
                .await?;
            state.audit.record(AuditEvent::blacklist(
                inv.user,
                &ctx.username,
                channel,
                target,
                true,
                reason.as_deref(),
            ));
            let html = format!(
                "🚫 User <code>{target}</code> can no longer post suggestions in <b>{}</b>.",
                title(state, channel).await
            );
            say(state, inv.chat, &html).await;
        }

        Command::Unblacklist { target, channel } => {
            let Some(channel) =
                resolve(state, ctx, channel, "Which channel should the user be allowed back in?")
                    .await?
            else {
                return Ok(());
            };
            let existed = state
                .service
                .blacklist_remove(inv.guild, channel, target)
                .await?;
            let name = title(state, channel).await;
            let html = if existed {
                state.audit.record(AuditEvent::blacklist(
                    inv.user,
                    &ctx.username,
                    channel,
                    target,
                    false,
                    None,
                ));
                format!("✅ User <code>{target}</code> can post suggestions in <b>{name}</b> again.")
            } else {
                format!("User <code>{target}</code> was not blacklisted in <b>{name}</b>.")
            };
            say(state, inv.chat, &html).await;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(text: &str) -> Command {
        match parse(text, None) {
            Parsed::Command(c) => c,
            other => panic!("expected a command for {text:?}, got {other:?}"),
        }
    }

    #[test]
    fn strips_bot_mention_and_lowercases() {
        assert_eq!(
            parse_command("/Setup@oxide_bot  -100123 "),
            ("setup".to_string(), "-100123".to_string())
        );
        assert_eq!(cmd("/help@oxide_bot"), Command::Help);
    }

    #[test]
    fn setup_requires_exactly_one_channel() {
        assert_eq!(
            cmd("/setup -1001"),
            Command::Setup {
                channel: ChannelId(-1001)
            }
        );
        assert!(matches!(parse("/setup", None), Parsed::Usage(_)));
        assert!(matches!(parse("/setup general", None), Parsed::Usage(_)));
    }

    #[test]
    fn channel_is_optional_where_a_picker_can_resolve_it() {
        assert_eq!(cmd("/settings"), Command::Settings { channel: None });
        assert_eq!(
            cmd("/removesetup -42"),
            Command::RemoveSetup {
                channel: Some(ChannelId(-42))
            }
        );
        match parse("/unrestrict a b", None) {
            Parsed::Usage(u) => assert!(u.contains("/unrestrict")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn toggle_takes_a_setting_name_and_switch() {
        assert_eq!(
            cmd("/toggle allow_attachments on"),
            Command::Toggle {
                key: SettingKey::AllowAttachments,
                value: true,
                channel: None,
            }
        );
        assert_eq!(
            cmd("/toggle enabled OFF -7"),
            Command::Toggle {
                key: SettingKey::Enabled,
                value: false,
                channel: Some(ChannelId(-7)),
            }
        );
        assert!(matches!(
            parse("/toggle colour on", None),
            Parsed::Usage(_)
        ));
        assert!(matches!(
            parse("/toggle enabled maybe", None),
            Parsed::Usage(_)
        ));
    }

    #[test]
    fn restrict_without_role_views_current() {
        assert_eq!(
            cmd("/restrict"),
            Command::Restrict {
                role: None,
                channel: None
            }
        );
        assert_eq!(
            cmd("/restrict -500 -600"),
            Command::Restrict {
                role: Some(RoleId(-500)),
                channel: Some(ChannelId(-600)),
            }
        );
        assert!(matches!(parse("/restrict mods", None), Parsed::Usage(_)));
    }

    #[test]
    fn suggestion_text_keeps_line_breaks() {
        assert_eq!(
            cmd("/anonsuggest first line\nsecond line"),
            Command::Suggest {
                anonymous: true,
                content: Some("first line\nsecond line".to_string()),
            }
        );
        // A photo caption may be just the command.
        assert_eq!(
            cmd("/suggest"),
            Command::Suggest {
                anonymous: false,
                content: None,
            }
        );
    }

    #[test]
    fn moderation_takes_an_id_and_optional_note() {
        assert_eq!(
            cmd("/decline #4 out of scope for now"),
            Command::Moderate {
                status: SuggestionStatus::Declined,
                sequence_id: 4,
                note: Some("out of scope for now".to_string()),
            }
        );
        assert_eq!(
            cmd("/consider 9"),
            Command::Moderate {
                status: SuggestionStatus::Considered,
                sequence_id: 9,
                note: None,
            }
        );
        assert!(matches!(parse("/accept zero", None), Parsed::Usage(_)));
        assert!(matches!(parse("/accept 0", None), Parsed::Usage(_)));
    }

    #[test]
    fn blacklist_target_from_id_or_reply() {
        assert_eq!(
            cmd("/blacklist 77 -100 spamming"),
            Command::Blacklist {
                target: UserId(77),
                channel: Some(ChannelId(-100)),
                reason: Some("spamming".to_string()),
            }
        );
        assert_eq!(
            parse("/blacklist repeated spam", Some(UserId(5))),
            Parsed::Command(Command::Blacklist {
                target: UserId(5),
                channel: None,
                reason: Some("repeated spam".to_string()),
            })
        );
        assert_eq!(
            parse("/unblacklist", Some(UserId(5))),
            Parsed::Command(Command::Unblacklist {
                target: UserId(5),
                channel: None,
            })
        );
        assert!(matches!(parse("/blacklist", None), Parsed::Usage(_)));
    }

    #[test]
    fn anonymous_command_message_is_removed_only_once_posted() {
        let posted = PostOutcome::Posted {
            sequence_id: 3,
            acknowledged_privately: true,
        };
        assert!(hides_command_message(true, &posted));
        assert!(!hides_command_message(false, &posted));
        assert!(!hides_command_message(true, &PostOutcome::Withdrawn));
        assert!(!hides_command_message(true, &PostOutcome::TimedOut));
    }

    #[test]
    fn foreign_commands_are_ignored() {
        assert_eq!(parse("/weather berlin", None), Parsed::Unknown);
    }

    #[test]
    fn only_help_and_suggest_skip_the_admin_check() {
        assert!(!Command::Help.needs_admin());
        assert!(!cmd("/suggest hi").needs_admin());
        assert!(cmd("/settings").needs_admin());
        assert!(cmd("/accept 1").needs_admin());
    }
}
