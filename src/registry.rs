// SPDX-License-Identifier: AGPL-3.0-or-later

//! Thread-safe mapping from canonical command name to a handler descriptor.
//!
//! Backed by [`DashMap`], the same concurrent-map primitive the teacher
//! codebase uses for its connection pool (`client::pool_sessions::Pool`).

use std::{future::Future, pin::Pin, sync::Arc};

use dashmap::DashMap;
use tracing::warn;

use crate::{errors::DispatchError, services::ExecutionContext, validate::validate_name};

/// A handler is an async function over a mutable execution context.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), DispatchError>> + Send>>;

pub trait Handler: Send + Sync {
    fn call(&self, ctx: &mut ExecutionContext) -> HandlerFuture;
}

impl<F, Fut> Handler for F
where
    F: Fn(&mut ExecutionContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), DispatchError>> + Send + 'static,
{
    fn call(&self, ctx: &mut ExecutionContext) -> HandlerFuture {
        Box::pin((self)(ctx))
    }
}

/// A registered command: its handler, required capabilities, provenance,
/// and help text. Immutable once registered -- callers only ever see it
/// behind an `Arc`.
pub struct CommandEntry {
    pub name: String,
    pub capabilities: Vec<String>,
    pub source: String,
    pub usage: String,
    pub help: String,
    handler: Arc<dyn Handler>,
}

impl CommandEntry {
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        capabilities: Vec<String>,
        usage: impl Into<String>,
        help: impl Into<String>,
        handler: impl Handler + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            capabilities,
            source: source.into(),
            usage: usage.into(),
            help: help.into(),
            handler: Arc::new(handler),
        }
    }

    /// A defensive copy of the required capability list; commands with an
    /// empty list require no authorization check.
    pub fn capabilities(&self) -> Vec<String> {
        self.capabilities.clone()
    }

    pub fn invoke(&self, ctx: &mut ExecutionContext) -> HandlerFuture {
        self.handler.call(ctx)
    }
}

impl std::fmt::Debug for CommandEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandEntry")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Thread-safe command registry, shared as `Arc<Registry>` across every
/// session's dispatch calls.
#[derive(Default)]
pub struct Registry {
    commands: DashMap<String, Arc<CommandEntry>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            commands: DashMap::new(),
        }
    }

    /// Registers `entry` under its own name. A name collision is not an
    /// error -- last writer wins, and a warning records both source tags.
    pub fn register(&self, entry: CommandEntry) -> Result<(), DispatchError> {
        validate_name(&entry.name, "command")?;
        let entry = Arc::new(entry);
        if let Some(previous) = self.commands.insert(entry.name.clone(), entry.clone()) {
            warn!(
                command = %entry.name,
                previous_source = %previous.source,
                new_source = %entry.source,
                "command registration overwrote an existing entry"
            );
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<CommandEntry>> {
        self.commands.get(name).map(|e| e.clone())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.commands.contains_key(name)
    }

    /// A defensive copy of every registered entry.
    pub fn list_all(&self) -> Vec<Arc<CommandEntry>> {
        self.commands.iter().map(|e| e.value().clone()).collect()
    }

    pub fn remove(&self, name: &str) -> Option<Arc<CommandEntry>> {
        self.commands.remove(name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_entry(name: &str, source: &str) -> CommandEntry {
        CommandEntry::new(name, source, vec![], "", "", |_ctx: &mut ExecutionContext| async {
            Ok(())
        })
    }

    #[test]
    fn register_and_get_round_trips() {
        let registry = Registry::new();
        registry.register(noop_entry("look", "core")).expect("valid");
        assert!(registry.get("look").is_some());
        assert!(registry.is_registered("look"));
    }

    #[test]
    fn rejects_invalid_names() {
        let registry = Registry::new();
        assert!(registry.register(noop_entry("1bad", "core")).is_err());
    }

    #[test]
    fn last_writer_wins_on_duplicate_registration() {
        let registry = Registry::new();
        registry.register(noop_entry("look", "core")).expect("valid");
        registry.register(noop_entry("look", "plugin-x")).expect("valid");
        let entry = registry.get("look").expect("present");
        assert_eq!(entry.source, "plugin-x");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn list_all_reflects_distinct_names_minus_removals() {
        let registry = Registry::new();
        registry.register(noop_entry("look", "core")).expect("valid");
        registry.register(noop_entry("say", "core")).expect("valid");
        registry.register(noop_entry("look", "plugin-x")).expect("valid");
        assert_eq!(registry.list_all().len(), 2);
        registry.remove("say");
        assert_eq!(registry.list_all().len(), 1);
    }

    #[test]
    fn capabilities_are_a_defensive_copy() {
        let entry = CommandEntry::new(
            "admin",
            "core",
            vec!["admin.manage".to_string()],
            "",
            "",
            |_ctx: &mut ExecutionContext| async { Ok(()) },
        );
        let mut caps = entry.capabilities();
        caps.push("extra".to_string());
        assert_eq!(entry.capabilities(), vec!["admin.manage".to_string()]);
    }
}
