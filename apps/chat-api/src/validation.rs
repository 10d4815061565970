//! Shape checks for pseudos and message submissions.
//!
//! Every input is sanitized first; lengths are measured on the sanitized text
//! in Unicode scalar values.

use std::fmt;

use crate::models::message::MessageType;
use crate::sanitize::sanitize;

pub const PSEUDO_MIN_LENGTH: usize = 2;
pub const PSEUDO_MAX_LENGTH: usize = 20;
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 500;

/// Which user-supplied value a length rejection refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Pseudo,
    Message,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Pseudo => f.write_str("Pseudo"),
            Field::Message => f.write_str("Message"),
        }
    }
}

/// Why a client request was refused. The `Display` text is what the client sees.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectionReason {
    #[error("{field} must be at least {min} characters long")]
    TooShort { field: Field, min: usize },
    #[error("{field} must be at most {max} characters long")]
    TooLong { field: Field, max: usize },
    #[error("Message cannot be empty")]
    Empty,
    #[error("Invalid message type")]
    InvalidType,
    #[error("This pseudo is already taken")]
    PseudoTaken,
    #[error("{0} is required")]
    MissingPayload(&'static str),
    #[error("Already authenticated")]
    AlreadyAuthenticated,
}

/// A message submission that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedMessage {
    pub content: String,
    pub kind: MessageType,
}

/// Sanitize and length-check a requested pseudo.
pub fn validate_pseudo(raw: &str) -> Result<String, RejectionReason> {
    let pseudo = sanitize(raw);
    let len = pseudo.chars().count();

    if len < PSEUDO_MIN_LENGTH {
        return Err(RejectionReason::TooShort {
            field: Field::Pseudo,
            min: PSEUDO_MIN_LENGTH,
        });
    }
    if len > PSEUDO_MAX_LENGTH {
        return Err(RejectionReason::TooLong {
            field: Field::Pseudo,
            max: PSEUDO_MAX_LENGTH,
        });
    }
    Ok(pseudo)
}

/// Sanitize message content and check it together with the requested type.
pub fn validate_message(
    raw_content: &str,
    raw_type: &str,
    max_length: usize,
) -> Result<ValidatedMessage, RejectionReason> {
    let content = sanitize(raw_content);

    if content.is_empty() {
        return Err(RejectionReason::Empty);
    }
    if content.chars().count() > max_length {
        return Err(RejectionReason::TooLong {
            field: Field::Message,
            max: max_length,
        });
    }
    let kind = raw_type.parse::<MessageType>()?;

    Ok(ValidatedMessage { content, kind })
}
