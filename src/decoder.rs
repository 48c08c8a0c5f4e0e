// 🔍 Track Data Decoder
// Raw magnetic-stripe text -> SwipeEvent, or a classified rejection
//
// The reader emits one line per swipe, e.g. `B%12345670?;=1BADGE99=99`:
//   - identity: between `%` and the first `?`, minus one trailing pad char
//   - badge:    between the first and second `=`, minus one leading pad char

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::event::SwipeEvent;

// ============================================================================
// READER FORMAT
// ============================================================================

/// Value a timed-out prompt hands back instead of track data
pub const TIMEOUT_SENTINEL: &str = "TIMEOUT";

pub const SEPARATOR: char = '=';
pub const SEPARATOR_COUNT: usize = 2;

/// Input must be strictly longer than this
pub const MIN_LENGTH: usize = 15;

pub const MIN_IDENTITY_LENGTH: usize = 7;

const IDENTITY_START: char = '%';
const IDENTITY_END: char = '?';

/// Pad characters the reader adds around the data fields
pub const TRIM_LEADING: usize = 1;
pub const TRIM_TRAILING: usize = 1;

// ============================================================================
// REJECTIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectKind {
    Timeout,
    Malformed,
    TooShort,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("no swipe before timeout")]
    Timeout,

    #[error("expected 2 '=' separators, found {0}")]
    SeparatorCount(usize),

    #[error("track data too short ({0} chars, need more than 15)")]
    InputTooShort(usize),

    #[error("track data has no identity field")]
    MissingIdentity,

    #[error("identity too short ({0} chars, need at least 7)")]
    IdentityTooShort(usize),
}

impl DecodeError {
    pub fn kind(&self) -> RejectKind {
        match self {
            DecodeError::Timeout => RejectKind::Timeout,
            DecodeError::SeparatorCount(_)
            | DecodeError::InputTooShort(_)
            | DecodeError::MissingIdentity => RejectKind::Malformed,
            DecodeError::IdentityTooShort(_) => RejectKind::TooShort,
        }
    }
}

// ============================================================================
// DECODER
// ============================================================================

/// Decode a swipe captured right now.
pub fn decode(raw: &str) -> Result<SwipeEvent, DecodeError> {
    decode_at(raw, Utc::now())
}

/// Decode a swipe with an explicit capture time.
///
/// Checks run in a fixed order and stop at the first failure: sentinel,
/// separator count, overall length, identity length.
pub fn decode_at(raw: &str, captured_at: DateTime<Utc>) -> Result<SwipeEvent, DecodeError> {
    if raw == TIMEOUT_SENTINEL {
        return Err(DecodeError::Timeout);
    }

    let separators = raw.matches(SEPARATOR).count();
    if separators != SEPARATOR_COUNT {
        return Err(DecodeError::SeparatorCount(separators));
    }

    let length = raw.chars().count();
    if length <= MIN_LENGTH {
        return Err(DecodeError::InputTooShort(length));
    }

    let identity = identity_segment(raw).ok_or(DecodeError::MissingIdentity)?;
    let badge = badge_segment(raw);

    let identity_len = identity.chars().count();
    if identity_len < MIN_IDENTITY_LENGTH {
        return Err(DecodeError::IdentityTooShort(identity_len));
    }

    Ok(SwipeEvent::new(
        identity.to_string(),
        badge.to_string(),
        raw.to_string(),
        captured_at,
    ))
}

fn identity_segment(raw: &str) -> Option<&str> {
    let head = raw.split(IDENTITY_END).next()?;
    let field = head.split(IDENTITY_START).nth(1)?;
    Some(drop_trailing(field, TRIM_TRAILING))
}

fn badge_segment(raw: &str) -> &str {
    // Separator count was checked, so the second field always exists
    let field = raw.split(SEPARATOR).nth(1).unwrap_or("");
    drop_leading(field, TRIM_LEADING)
}

fn drop_leading(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[idx..],
        None => "",
    }
}

fn drop_trailing(s: &str, n: usize) -> &str {
    let count = s.chars().count();
    if n >= count {
        return "";
    }
    match s.char_indices().nth(count - n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
