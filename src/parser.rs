// SPDX-License-Identifier: AGPL-3.0-or-later

//! Splits a raw input line into a first token and the remainder. Tokenizing
//! beyond the first word is out of scope; `args` is handed to the command
//! handler byte-for-byte.

use crate::errors::DispatchError;

const WHITESPACE: &[char] = &[' ', '\t'];

/// The result of splitting a line into its first token and tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    /// The original, unmodified input.
    pub raw: String,
    /// The first whitespace-delimited token.
    pub name: String,
    /// Everything after the first token, with leading whitespace stripped.
    /// Internal whitespace is preserved byte-for-byte.
    pub args: String,
}

/// Parses `input`. Returns [`DispatchError::EmptyInput`] if, after trimming
/// leading/trailing spaces and tabs, nothing remains.
pub fn parse_line(input: &str) -> Result<ParsedLine, DispatchError> {
    let trimmed = input.trim_matches(WHITESPACE);
    if trimmed.is_empty() {
        return Err(DispatchError::EmptyInput);
    }

    let (name, args) = match trimmed.find(WHITESPACE) {
        Some(idx) => {
            let (name, rest) = trimmed.split_at(idx);
            (name, rest.trim_start_matches(WHITESPACE))
        },
        None => (trimmed, ""),
    };

    Ok(ParsedLine {
        raw: input.to_string(),
        name: name.to_string(),
        args: args.to_string(),
    })
}
