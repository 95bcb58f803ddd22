use thiserror::Error;
use uuid::Uuid;

/// Ceiling on inbound message size. Guards cost and abuse, not correctness.
pub const MAX_MESSAGE_LENGTH: usize = 10_000;

const MAX_THREAD_ID_LENGTH: usize = 100;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("message must not be empty")]
    EmptyMessage,
    #[error("message exceeds {MAX_MESSAGE_LENGTH} characters")]
    MessageTooLong,
    #[error("thread_id may only contain letters, digits, `-` and `_` (max {MAX_THREAD_ID_LENGTH} characters)")]
    InvalidThreadId,
}

pub fn validate_message(message: &str) -> Result<&str, InputError> {
    let trimmed = message.trim();
    if trimmed.is_empty() {
        return Err(InputError::EmptyMessage);
    }
    if trimmed.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(InputError::MessageTooLong);
    }
    Ok(trimmed)
}

pub fn validate_thread_id(thread_id: &str) -> Result<(), InputError> {
    let valid_length = (1..=MAX_THREAD_ID_LENGTH).contains(&thread_id.len());
    let valid_chars = thread_id
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    if valid_length && valid_chars {
        Ok(())
    } else {
        Err(InputError::InvalidThreadId)
    }
}

/// Fresh thread id for a conversation the caller did not name:
/// `{uid}_{12 hex chars}`. Provider uids are not under our control, so the
/// uid is reduced to the thread id charset first; a uid with no usable
/// characters falls back to a `t` prefix.
pub fn generate_thread_id(uid: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    let prefix: String = uid
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '-' || *ch == '_')
        .take(MAX_THREAD_ID_LENGTH - 13)
        .collect();
    if prefix.is_empty() {
        return format!("t_{}", &suffix[..12]);
    }
    format!("{prefix}_{}", &suffix[..12])
}

#[cfg(test)]
mod tests {
    use super::{
        generate_thread_id, validate_message, validate_thread_id, InputError, MAX_MESSAGE_LENGTH,
    };

    #[test]
    fn messages_are_trimmed_and_bounded() {
        assert_eq!(validate_message("  hello  ").unwrap(), "hello");
        assert_eq!(validate_message("   "), Err(InputError::EmptyMessage));
        assert_eq!(
            validate_message(&"x".repeat(MAX_MESSAGE_LENGTH + 1)),
            Err(InputError::MessageTooLong)
        );
        assert!(validate_message(&"x".repeat(MAX_MESSAGE_LENGTH)).is_ok());
    }

    #[test]
    fn thread_ids_allow_a_narrow_charset() {
        assert!(validate_thread_id("user-1_abc123").is_ok());
        assert_eq!(validate_thread_id(""), Err(InputError::InvalidThreadId));
        assert_eq!(validate_thread_id("has space"), Err(InputError::InvalidThreadId));
        assert_eq!(validate_thread_id("path/../traversal"), Err(InputError::InvalidThreadId));
        assert_eq!(validate_thread_id(&"t".repeat(101)), Err(InputError::InvalidThreadId));
    }

    #[test]
    fn generated_thread_ids_validate() {
        let thread_id = generate_thread_id("user-1");
        assert!(thread_id.starts_with("user-1_"));
        validate_thread_id(&thread_id).expect("generated ids must pass validation");
    }

    #[test]
    fn generated_thread_ids_survive_hostile_uids() {
        let thread_id = generate_thread_id("auth0|user@example.com");
        assert!(thread_id.starts_with("auth0userexamplecom_"));
        validate_thread_id(&thread_id).expect("sanitized uid must pass validation");

        let thread_id = generate_thread_id("@@//..");
        assert!(thread_id.starts_with("t_"));
        validate_thread_id(&thread_id).expect("fallback id must pass validation");

        let thread_id = generate_thread_id(&"u".repeat(500));
        validate_thread_id(&thread_id).expect("long uids must be truncated to fit");
    }
}
