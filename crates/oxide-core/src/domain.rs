use std::fmt;

/// Platform user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Platform chat id (numeric). Any place a message can be sent to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Platform message id (numeric, scoped to a chat).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a rendered message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// The community a command was issued in. Owns channel configs and the suggestion sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GuildId(pub i64);

/// A chat that suggestions get rendered into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChannelId(pub i64);

/// A role a poster must hold when a channel is restricted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RoleId(pub i64);

/// Per-guild suggestion number, starting at 1.
pub type SequenceId = i64;

impl From<ChannelId> for ChatId {
    fn from(c: ChannelId) -> Self {
        ChatId(c.0)
    }
}

impl From<GuildId> for ChatId {
    fn from(g: GuildId) -> Self {
        ChatId(g.0)
    }
}

macro_rules! display_id {
    ($($t:ty),*) => {
        $(impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        })*
    };
}

display_id!(UserId, ChatId, GuildId, ChannelId, RoleId);
