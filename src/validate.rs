// SPDX-License-Identifier: AGPL-3.0-or-later

//! Shared character-class validation for command and alias names.

use crate::errors::DispatchError;

/// Upper bound on the length of a command or alias name, after trimming.
pub const MAX_NAME_LENGTH: usize = 20;

const EXTRA_CHARS: &[char] = &['_', '!', '?', '@', '#', '$', '%', '^', '+', '-'];

/// Validates `name` as either a `"command"` or `"alias"` identifier.
///
/// Rules: trimmed length 1..=20, first character an ASCII letter,
/// subsequent characters ASCII alphanumeric or one of `_ ! ? @ # $ % ^ + -`.
pub fn validate_name(name: &str, kind: &'static str) -> Result<(), DispatchError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(DispatchError::InvalidName {
            kind,
            name: name.to_string(),
            length: 0,
            max: MAX_NAME_LENGTH,
        });
    }

    let length = trimmed.chars().count();
    if length > MAX_NAME_LENGTH {
        return Err(DispatchError::InvalidName {
            kind,
            name: trimmed.to_string(),
            length,
            max: MAX_NAME_LENGTH,
        });
    }

    // A single non-letter, non-whitespace character is the one carve-out in
    // the shared ruleset: it is how a prefix alias (e.g. ":", ";") is named.
    // Commands can never collide with it because a command name must start
    // with a letter regardless of length.
    if kind == "alias" && length == 1 {
        let only = trimmed.chars().next().expect("length == 1");
        if only.is_ascii_graphic() {
            return Ok(());
        }
    }

    let mut chars = trimmed.chars();
    let first = chars.next().expect("non-empty checked above");
    if !first.is_ascii_alphabetic() {
        return Err(DispatchError::InvalidName {
            kind,
            name: trimmed.to_string(),
            length,
            max: MAX_NAME_LENGTH,
        });
    }

    for c in chars {
        if !(c.is_ascii_alphanumeric() || EXTRA_CHARS.contains(&c)) {
            return Err(DispatchError::InvalidName {
                kind,
                name: trimmed.to_string(),
                length,
                max: MAX_NAME_LENGTH,
            });
        }
    }

    Ok(())
}
