use crate::{
    domain::{ChannelId, RoleId, SequenceId},
    store::SuggestionStatus,
};

/// Core error type.
///
/// Adapter crates map their specific errors into this type so the bot core can
/// handle failures consistently (user-facing message vs retryable).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // User input: surfaced verbatim, never retried.
    #[error("suggestions are already configured in channel {0}")]
    AlreadyConfigured(ChannelId),

    #[error("suggestions are not configured in channel {0}")]
    NotConfigured(ChannelId),

    #[error("suggestions are currently disabled in this channel")]
    ChannelDisabled,

    #[error("you need role {0} to post suggestions in this channel")]
    RoleRequired(RoleId),

    #[error("attachments are not allowed in this channel")]
    AttachmentsDisallowed,

    #[error("anonymous suggestions are not allowed in this channel")]
    AnonymousDisallowed,

    #[error("a suggestion needs text or an attachment")]
    EmptySuggestion,

    #[error("this suggestion is too long, keep it under {max} characters")]
    SuggestionTooLong { max: usize },

    #[error("you are blacklisted from posting suggestions in this channel{}", reason_suffix(.reason))]
    Blacklisted { reason: Option<String> },

    #[error("suggestion #{sequence_id} was already {status}")]
    AlreadyResolved {
        sequence_id: SequenceId,
        status: SuggestionStatus,
    },

    #[error("suggestion #{0} does not exist")]
    NotFound(SequenceId),

    #[error("unknown setting: {0}")]
    UnknownSetting(String),

    // Environment: logged, operation aborted, user told to retry.
    #[error("the message for suggestion #{0} could not be found")]
    RenderedMessageMissing(SequenceId),

    #[error("failed to render suggestion: {0}")]
    RenderFailed(String),

    #[error("external error: {0}")]
    External(String),

    // Invariant: programming or race defect, rejected at the store boundary.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification used by the host layer to decide how to report a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    UserInput,
    Environment,
    Invariant,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::AlreadyConfigured(_)
            | Error::NotConfigured(_)
            | Error::ChannelDisabled
            | Error::RoleRequired(_)
            | Error::AttachmentsDisallowed
            | Error::AnonymousDisallowed
            | Error::EmptySuggestion
            | Error::SuggestionTooLong { .. }
            | Error::Blacklisted { .. }
            | Error::AlreadyResolved { .. }
            | Error::NotFound(_) => ErrorKind::UserInput,
            Error::RenderedMessageMissing(_) | Error::RenderFailed(_) | Error::External(_) => {
                ErrorKind::Environment
            }
            Error::InvariantViolation(_) | Error::UnknownSetting(_) => ErrorKind::Invariant,
            Error::Config(_) | Error::Database(_) | Error::Io(_) | Error::Json(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Text suitable for showing to the user who triggered the operation.
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::UserInput => format!("❌ {}", capitalize(&self.to_string())),
            ErrorKind::Environment => {
                format!("⚠️ {}. Please try again.", capitalize(&self.to_string()))
            }
            ErrorKind::Invariant | ErrorKind::Internal => {
                "⚠️ Something went wrong. Please try again.".to_string()
            }
        }
    }
}

fn reason_suffix(reason: &Option<String>) -> String {
    match reason.as_deref() {
        Some(r) if !r.trim().is_empty() => format!(" (reason: {r})"),
        _ => String::new(),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_input_errors_are_shown_verbatim() {
        let err = Error::Blacklisted {
            reason: Some("spam".to_string()),
        };
        assert_eq!(err.kind(), ErrorKind::UserInput);
        assert_eq!(
            err.user_message(),
            "❌ You are blacklisted from posting suggestions in this channel (reason: spam)"
        );

        let bare = Error::Blacklisted { reason: None };
        assert!(!bare.to_string().contains("reason"));
    }

    #[test]
    fn environment_errors_ask_for_retry() {
        let err = Error::RenderedMessageMissing(4);
        assert_eq!(err.kind(), ErrorKind::Environment);
        assert!(err.user_message().ends_with("Please try again."));
    }

    #[test]
    fn invariant_errors_hide_details() {
        let err = Error::InvariantViolation("duplicate key".to_string());
        assert_eq!(err.kind(), ErrorKind::Invariant);
        assert!(!err.user_message().contains("duplicate"));
    }
}
