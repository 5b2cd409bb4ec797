// SPDX-License-Identifier: AGPL-3.0-or-later

//! The closed error taxonomy shared by every component of the dispatch
//! pipeline, plus the pure translation from an error to a player-facing
//! message.

use thiserror::Error;

/// Every error the dispatch core can produce, propagated unchanged from its
/// point of origin up to the network layer.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("empty input")]
    EmptyInput,

    #[error("unknown command: {command}")]
    UnknownCommand { command: String },

    #[error("permission denied for {command}: missing {capability}")]
    PermissionDenied { command: String, capability: String },

    #[error("invalid args for {command}")]
    InvalidArgs {
        command: String,
        usage: Option<String>,
    },

    #[error("world error: {message}")]
    WorldError {
        message: String,
        #[source]
        cause: Option<anyhow::Error>,
    },

    #[error("rate limited, cooldown {cooldown_ms}ms")]
    RateLimited { cooldown_ms: u64 },

    #[error("circular alias: {alias}")]
    CircularAlias { alias: String },

    #[error("alias {alias} conflicts with existing command {existing_command}")]
    AliasConflict {
        alias: String,
        existing_command: String,
    },

    #[error("no character selected")]
    NoCharacter,

    #[error("target not found: {target}")]
    TargetNotFound { target: String },

    #[error("services unavailable")]
    NilServices,

    #[error("invalid {kind} name {name:?}: {length} chars, max {max}")]
    InvalidName {
        kind: &'static str,
        name: String,
        length: usize,
        max: usize,
    },

    #[error("alias system is not available")]
    NoAliasCache,

    #[error("shutdown requested")]
    ShutdownRequested,
}

impl DispatchError {
    /// Stable, lowercase tag used as a metric/log label for this variant.
    pub fn tag(&self) -> &'static str {
        match self {
            DispatchError::EmptyInput => "empty_input",
            DispatchError::UnknownCommand { .. } => "unknown_command",
            DispatchError::PermissionDenied { .. } => "permission_denied",
            DispatchError::InvalidArgs { .. } => "invalid_args",
            DispatchError::WorldError { .. } => "world_error",
            DispatchError::RateLimited { .. } => "rate_limited",
            DispatchError::CircularAlias { .. } => "circular_alias",
            DispatchError::AliasConflict { .. } => "alias_conflict",
            DispatchError::NoCharacter => "no_character",
            DispatchError::TargetNotFound { .. } => "target_not_found",
            DispatchError::NilServices => "nil_services",
            DispatchError::InvalidName { .. } => "invalid_name",
            DispatchError::NoAliasCache => "no_alias_cache",
            DispatchError::ShutdownRequested => "shutdown_requested",
        }
    }
}

/// Maps any [`DispatchError`] to the string shown to the player. Never
/// panics, never leaks internal diagnostics beyond what the taxonomy
/// declares safe to show verbatim (`WorldError`, `InvalidName`).
pub fn player_message(err: &DispatchError) -> String {
    match err {
        DispatchError::EmptyInput => "Something went wrong. Try again.".to_string(),
        DispatchError::UnknownCommand { .. } => "Unknown command. Try 'help'.".to_string(),
        DispatchError::PermissionDenied { .. } => {
            "You don't have permission to do that.".to_string()
        },
        DispatchError::InvalidArgs { usage, .. } => match usage {
            Some(usage) => format!("Usage: {usage}"),
            None => "Invalid arguments.".to_string(),
        },
        DispatchError::WorldError { message, .. } => message.clone(),
        DispatchError::RateLimited { .. } => {
            "Too many commands. Please slow down.".to_string()
        },
        DispatchError::CircularAlias { .. } => {
            "Alias rejected: circular reference detected (expansion depth exceeded)"
                .to_string()
        },
        DispatchError::AliasConflict {
            alias,
            existing_command,
        } => format!(
            "Alias '{alias}' conflicts with command '{existing_command}'. Remove the \
             existing alias before retrying."
        ),
        DispatchError::NoCharacter => {
            "No character selected. Please select a character first.".to_string()
        },
        DispatchError::TargetNotFound { target } => format!("Target not found: {target}"),
        DispatchError::NilServices => "Internal error: services unavailable.".to_string(),
        DispatchError::InvalidName { .. } => err.to_string(),
        DispatchError::NoAliasCache => {
            "Alias system is not available. Contact the server administrator.".to_string()
        },
        DispatchError::ShutdownRequested => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_kind_still_has_a_message() {
        let err = DispatchError::UnknownCommand {
            command: "frobnicate".to_string(),
        };
        assert_eq!(player_message(&err), "Unknown command. Try 'help'.");
    }

    #[test]
    fn invalid_args_falls_back_without_usage() {
        let err = DispatchError::InvalidArgs {
            command: "go".to_string(),
            usage: None,
        };
        assert_eq!(player_message(&err), "Invalid arguments.");
    }

    #[test]
    fn invalid_args_templates_usage() {
        let err = DispatchError::InvalidArgs {
            command: "go".to_string(),
            usage: Some("go <direction>".to_string()),
        };
        assert_eq!(player_message(&err), "Usage: go <direction>");
    }

    #[test]
    fn world_error_is_verbatim() {
        let err = DispatchError::WorldError {
            message: "The door is locked.".to_string(),
            cause: None,
        };
        assert_eq!(player_message(&err), "The door is locked.");
    }
}
