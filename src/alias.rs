// SPDX-License-Identifier: AGPL-3.0-or-later

//! Player and system command aliases, held behind a single readers-writer
//! lock (`parking_lot::RwLock`) rather than two separately locked maps, to
//! avoid a lock-ordering hazard between player and system scope.
//!
//! Expansion is recursive and depth-bounded rather than cycle-tracked at
//! resolve time: a cycle can only be introduced by `set_player`/`set_system`,
//! and those reject it up front, so `resolve` only ever needs a counter.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::{errors::DispatchError, ids::PlayerId, registry::Registry, validate::validate_name};

/// A chain longer than this is treated as a cycle even if it never
/// literally revisits its starting name; callers depend on this bound.
pub const MAX_EXPANSION_DEPTH: usize = 10;

const WHITESPACE: &[char] = &[' ', '\t'];

#[derive(Default)]
struct AliasState {
    system: HashMap<String, String>,
    players: HashMap<PlayerId, HashMap<String, String>>,
}

/// The result of resolving one line of player input against the alias
/// tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveResult {
    /// The line to hand to the parser and dispatcher.
    pub resolved: String,
    pub was_alias: bool,
    /// The alias name that triggered expansion, empty when `was_alias` is
    /// false.
    pub alias_used: String,
}

impl ResolveResult {
    fn unchanged(raw: &str) -> Self {
        Self {
            resolved: raw.to_string(),
            was_alias: false,
            alias_used: String::new(),
        }
    }
}

pub struct AliasCache {
    state: RwLock<AliasState>,
}

impl Default for AliasCache {
    fn default() -> Self {
        Self::new()
    }
}

impl AliasCache {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(AliasState::default()),
        }
    }

    /// Bulk-installs system aliases, e.g. at startup from configuration.
    /// Trusts the caller to have already run [`validate_candidate_set`].
    pub fn load_system(&self, entries: HashMap<String, String>) {
        self.state.write().system = entries;
    }

    pub fn load_player(&self, player: PlayerId, entries: HashMap<String, String>) {
        self.state.write().players.insert(player, entries);
    }

    /// Installs a system alias. Rejected if it would complete a cycle
    /// within 10 expansion steps; the previous binding (if any) is
    /// restored on rejection.
    pub fn set_system(&self, name: &str, expansion: &str) -> Result<(), DispatchError> {
        validate_name(name, "alias")?;
        let mut state = self.state.write();
        let previous = state.system.get(name).cloned();
        state.system.insert(name.to_string(), expansion.to_string());

        let cycle = {
            let system = &state.system;
            probe_cycle(|n| system.get(n).cloned(), name)
        };
        if cycle {
            match previous {
                Some(prev) => {
                    state.system.insert(name.to_string(), prev);
                },
                None => {
                    state.system.remove(name);
                },
            }
            return Err(DispatchError::CircularAlias {
                alias: name.to_string(),
            });
        }
        Ok(())
    }

    /// Installs a player alias, shadowing any system alias of the same
    /// name for that player. Same cycle rejection as [`Self::set_system`],
    /// probed against this player's combined (player-then-system) view.
    pub fn set_player(
        &self,
        player: PlayerId,
        name: &str,
        expansion: &str,
    ) -> Result<(), DispatchError> {
        validate_name(name, "alias")?;
        let mut state = self.state.write();

        let previous = {
            let player_map = state.players.entry(player).or_default();
            let previous = player_map.get(name).cloned();
            player_map.insert(name.to_string(), expansion.to_string());
            previous
        };

        let cycle = {
            let players = &state.players;
            let system = &state.system;
            probe_cycle(
                |n| {
                    players
                        .get(&player)
                        .and_then(|m| m.get(n))
                        .or_else(|| system.get(n))
                        .cloned()
                },
                name,
            )
        };
        if cycle {
            let player_map = state
                .players
                .get_mut(&player)
                .expect("just inserted above");
            match previous {
                Some(prev) => {
                    player_map.insert(name.to_string(), prev);
                },
                None => {
                    player_map.remove(name);
                },
            }
            return Err(DispatchError::CircularAlias {
                alias: name.to_string(),
            });
        }
        Ok(())
    }

    pub fn remove_system(&self, name: &str) -> Option<String> {
        self.state.write().system.remove(name)
    }

    pub fn remove_player(&self, player: PlayerId, name: &str) -> Option<String> {
        self.state
            .write()
            .players
            .get_mut(&player)
            .and_then(|m| m.remove(name))
    }

    pub fn clear_player(&self, player: PlayerId) {
        self.state.write().players.remove(&player);
    }

    /// Resolves `raw` against this player's aliases (player scope shadows
    /// system scope), expanding recursively up to [`MAX_EXPANSION_DEPTH`].
    /// If `registry` is given and the input's first word is already a
    /// registered command, the input passes through unchanged -- aliases
    /// never shadow commands.
    pub fn resolve(&self, player: PlayerId, raw: &str, registry: Option<&Registry>) -> ResolveResult {
        let state = self.state.read();
        let trimmed = raw.trim_matches(WHITESPACE);
        if trimmed.is_empty() {
            return ResolveResult::unchanged(raw);
        }

        let (first_word, user_tail) = split_first_word(trimmed);

        if let Some(registry) = registry {
            if registry.is_registered(first_word) {
                return ResolveResult::unchanged(raw);
            }
        }

        let mut tails = Vec::new();
        let base = expand(&state, player, first_word, 0, &mut tails);
        if !tails.is_empty() {
            return ResolveResult {
                resolved: assemble(&base, &tails, user_tail),
                was_alias: true,
                alias_used: first_word.to_string(),
            };
        }

        if trimmed.chars().count() > 1 {
            let mut chars = trimmed.chars();
            let leading = chars.next().expect("checked non-empty above");
            if !leading.is_ascii_alphabetic() && !leading.is_whitespace() {
                let leading_str = leading.to_string();
                let rest: String = chars.collect();
                let mut prefix_tails = Vec::new();
                let prefix_base = expand(&state, player, &leading_str, 0, &mut prefix_tails);
                if !prefix_tails.is_empty() {
                    return ResolveResult {
                        resolved: assemble(&prefix_base, &prefix_tails, &rest),
                        was_alias: true,
                        alias_used: leading_str,
                    };
                }
            }
        }

        ResolveResult::unchanged(raw)
    }
}

/// Validates a proposed bulk set of alias bindings for internal cycles,
/// without touching any cache. Used ahead of [`AliasCache::load_system`]
/// or [`AliasCache::load_player`] so a bad config file is rejected before
/// anything is installed.
pub fn validate_candidate_set(candidates: &HashMap<String, String>) -> Result<(), DispatchError> {
    for name in candidates.keys() {
        if probe_cycle(|n| candidates.get(n).cloned(), name) {
            return Err(DispatchError::CircularAlias {
                alias: name.clone(),
            });
        }
    }
    Ok(())
}

/// Walks the expansion chain starting at `start`'s *new* binding (already
/// installed by the caller) looking for a return to `start` within
/// [`MAX_EXPANSION_DEPTH`] steps. A self-reference (`x -> x`) is caught on
/// the first step.
fn probe_cycle(lookup: impl Fn(&str) -> Option<String>, start: &str) -> bool {
    let mut current = start.to_string();
    for _ in 0..MAX_EXPANSION_DEPTH {
        let expansion = match lookup(&current) {
            Some(e) => e,
            None => return false,
        };
        let first_word = expansion
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_string();
        if first_word == start {
            return true;
        }
        if first_word.is_empty() {
            return false;
        }
        current = first_word;
    }
    false
}

/// Recursively expands `name`, pushing each level's tail (outer to inner)
/// onto `tails`. Returns the final, non-alias token. Stops at
/// [`MAX_EXPANSION_DEPTH`] and returns the current token unexpanded rather
/// than erroring -- a cycle this deep could only arise from a bug in the
/// cycle rejection at set time, not from anything `resolve` can see.
fn expand(
    state: &AliasState,
    player: PlayerId,
    name: &str,
    depth: usize,
    tails: &mut Vec<String>,
) -> String {
    if depth >= MAX_EXPANSION_DEPTH {
        return name.to_string();
    }

    let expansion = state
        .players
        .get(&player)
        .and_then(|m| m.get(name))
        .or_else(|| state.system.get(name));

    match expansion {
        None => name.to_string(),
        Some(expansion_str) => {
            let (first, tail) = split_first_word(expansion_str);
            tails.push(tail.to_string());
            expand(state, player, first, depth + 1, tails)
        },
    }
}

/// Joins `base` with `tails` reversed (innermost expansion first) and
/// finally the original user-supplied tail.
fn assemble(base: &str, tails_outer_to_inner: &[String], user_tail: &str) -> String {
    let mut reversed: Vec<&str> = tails_outer_to_inner.iter().map(String::as_str).collect();
    reversed.reverse();

    let mut parts: Vec<&str> = vec![base];
    for t in &reversed {
        if !t.is_empty() {
            parts.push(t);
        }
    }
    if !user_tail.is_empty() {
        parts.push(user_tail);
    }
    parts.join(" ")
}

fn split_first_word(s: &str) -> (&str, &str) {
    match s.find(WHITESPACE) {
        Some(idx) => {
            let (name, rest) = s.split_at(idx);
            (name, rest.trim_start_matches(WHITESPACE))
        },
        None => (s, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unaliased_input_passes_through() {
        let cache = AliasCache::new();
        let player = PlayerId::new();
        let result = cache.resolve(player, "look here", None);
        assert_eq!(result.resolved, "look here");
        assert!(!result.was_alias);
        assert_eq!(result.alias_used, "");
    }

    #[test]
    fn system_alias_expands_with_trailing_args() {
        let cache = AliasCache::new();
        cache.set_system("l", "look").expect("valid");
        let player = PlayerId::new();
        let result = cache.resolve(player, "l here", None);
        assert_eq!(result.resolved, "look here");
        assert!(result.was_alias);
        assert_eq!(result.alias_used, "l");
    }

    #[test]
    fn chained_aliases_concatenate_innermost_first() {
        let cache = AliasCache::new();
        cache.set_system("x", "y arg1").expect("valid");
        cache.set_system("y", "z arg2").expect("valid");
        cache.set_system("z", "done").expect("valid");
        let player = PlayerId::new();
        let result = cache.resolve(player, "x userarg", None);
        assert_eq!(result.resolved, "done arg2 arg1 userarg");
        assert!(result.was_alias);
        assert_eq!(result.alias_used, "x");
    }

    #[test]
    fn prefix_alias_matches_without_whitespace_separation() {
        let cache = AliasCache::new();
        cache.set_system(";", "pose").expect("valid");
        let player = PlayerId::new();
        let result = cache.resolve(player, ";'s eyes widen", None);
        assert_eq!(result.resolved, "pose 's eyes widen");
        assert!(result.was_alias);
        assert_eq!(result.alias_used, ";");
    }

    #[test]
    fn self_reference_is_rejected_immediately() {
        let cache = AliasCache::new();
        let err = cache.set_system("x", "x").unwrap_err();
        assert!(matches!(err, DispatchError::CircularAlias { alias } if alias == "x"));
    }

    #[test]
    fn indirect_cycle_is_rejected_and_previous_binding_restored() {
        let cache = AliasCache::new();
        cache.set_system("a", "b").expect("valid");
        cache.set_system("b", "c").expect("valid");
        let err = cache.set_system("c", "a").unwrap_err();
        assert!(matches!(err, DispatchError::CircularAlias { alias } if alias == "c"));
        // "c" had no previous binding, so it should be gone entirely.
        assert_eq!(cache.state.read().system.get("c"), None);
    }

    #[test]
    fn rejected_update_restores_previous_binding() {
        let cache = AliasCache::new();
        cache.set_system("a", "original").expect("valid");
        cache.set_system("a", "a").unwrap_err();
        assert_eq!(
            cache.state.read().system.get("a").map(String::as_str),
            Some("original")
        );
    }

    #[test]
    fn player_alias_shadows_system_alias() {
        let cache = AliasCache::new();
        let player = PlayerId::new();
        cache.set_system("l", "look").expect("valid");
        cache.set_player(player, "l", "listen").expect("valid");
        let result = cache.resolve(player, "l", None);
        assert_eq!(result.resolved, "listen");

        let other_player = PlayerId::new();
        let result = cache.resolve(other_player, "l", None);
        assert_eq!(result.resolved, "look");
    }

    #[test]
    fn registered_command_bypasses_alias_lookup() {
        let cache = AliasCache::new();
        let registry = Registry::new();
        cache.set_system("look", "listen").expect("valid");
        registry
            .register(crate::registry::CommandEntry::new(
                "look",
                "core",
                vec![],
                "",
                "",
                |_ctx: &mut crate::services::ExecutionContext| async { Ok(()) },
            ))
            .expect("valid");
        let player = PlayerId::new();
        let result = cache.resolve(player, "look here", Some(&registry));
        assert_eq!(result.resolved, "look here");
        assert!(!result.was_alias);
    }

    #[test]
    fn validate_candidate_set_catches_cycle_before_install() {
        let mut candidates = HashMap::new();
        candidates.insert("a".to_string(), "b".to_string());
        candidates.insert("b".to_string(), "a".to_string());
        assert!(validate_candidate_set(&candidates).is_err());
    }

    #[test]
    fn validate_candidate_set_accepts_acyclic_chain() {
        let mut candidates = HashMap::new();
        candidates.insert("a".to_string(), "b arg".to_string());
        candidates.insert("b".to_string(), "done".to_string());
        assert!(validate_candidate_set(&candidates).is_ok());
    }
}
