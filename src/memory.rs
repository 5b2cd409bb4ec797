// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-memory reference implementations of the external collaborator
//! traits. Used by the demo binary and by integration tests; never
//! intended as a production authorization or event store backend.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::{
    errors::DispatchError,
    ids::SessionId,
    services::{Authorizer, Broadcaster, Decision, Event, EventStore, PolicyEngine, SessionInfo, SessionService},
};

/// Capability grants keyed by subject string (e.g. `"char:<id>"`), held
/// in a `HashMap` behind a lock.
#[derive(Default)]
pub struct InMemoryAuthorizer {
    grants: RwLock<HashMap<String, HashSet<String>>>,
}

impl InMemoryAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, subject: impl Into<String>, capability: impl Into<String>) {
        self.grants
            .write()
            .entry(subject.into())
            .or_default()
            .insert(capability.into());
    }

    pub fn revoke(&self, subject: &str, capability: &str) {
        if let Some(caps) = self.grants.write().get_mut(subject) {
            caps.remove(capability);
        }
    }
}

#[async_trait]
impl Authorizer for InMemoryAuthorizer {
    async fn check(
        &self,
        subject: &str,
        _action: &str,
        resource: &str,
    ) -> Result<bool, DispatchError> {
        Ok(self
            .grants
            .read()
            .get(subject)
            .is_some_and(|caps| caps.contains(resource)))
    }
}

#[async_trait]
impl PolicyEngine for InMemoryAuthorizer {
    async fn decide(
        &self,
        subject: &str,
        action: &str,
        resource: &str,
    ) -> Result<Decision, DispatchError> {
        let allowed = self.check(subject, action, resource).await?;
        Ok(if allowed {
            Decision::Allow
        } else {
            Decision::Deny
        })
    }
}

/// Tracks active sessions for the demo binary; real deployments back this
/// with whatever owns the network connection.
#[derive(Default)]
pub struct InMemorySessionService {
    sessions: RwLock<HashMap<SessionId, SessionInfo>>,
}

impl InMemorySessionService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session: SessionId, info: SessionInfo) {
        self.sessions.write().insert(session, info);
    }
}

#[async_trait]
impl SessionService for InMemorySessionService {
    async fn list_active(&self) -> anyhow::Result<Vec<SessionId>> {
        Ok(self.sessions.read().keys().copied().collect())
    }

    async fn get_session(&self, session: SessionId) -> anyhow::Result<Option<SessionInfo>> {
        Ok(self.sessions.read().get(&session).cloned())
    }

    async fn end_session(&self, session: SessionId) -> anyhow::Result<()> {
        self.sessions.write().remove(&session);
        Ok(())
    }
}

/// Append-only in-memory event log, one `Vec` per stream behind a lock.
/// Subscribers are not fed historical events, only ones appended after
/// they subscribe.
#[derive(Default)]
pub struct InMemoryEventStore {
    streams: RwLock<HashMap<String, Vec<Event>>>,
    subscribers: RwLock<HashMap<String, Vec<mpsc::Sender<Event>>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, stream: &str, event: Event) -> anyhow::Result<String> {
        let id = event.id.clone();
        {
            let mut subs = self.subscribers.write();
            if let Some(senders) = subs.get_mut(stream) {
                senders.retain(|tx| tx.try_send(event.clone()).is_ok() || !tx.is_closed());
            }
        }
        self.streams
            .write()
            .entry(stream.to_string())
            .or_default()
            .push(event);
        Ok(id)
    }

    async fn replay(&self, stream: &str, since: Option<&str>) -> anyhow::Result<Vec<Event>> {
        let streams = self.streams.read();
        let Some(events) = streams.get(stream) else {
            return Ok(Vec::new());
        };
        let events = match since {
            None => events.clone(),
            Some(since_id) => events
                .iter()
                .skip_while(|e| e.id != since_id)
                .skip(1)
                .cloned()
                .collect(),
        };
        Ok(events)
    }

    async fn last_event_id(&self, stream: &str) -> anyhow::Result<Option<String>> {
        Ok(self
            .streams
            .read()
            .get(stream)
            .and_then(|events| events.last())
            .map(|e| e.id.clone()))
    }

    async fn subscribe(&self, stream: &str) -> anyhow::Result<mpsc::Receiver<Event>> {
        let (tx, rx) = mpsc::channel(64);
        self.subscribers
            .write()
            .entry(stream.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }
}

/// Fans a text message out to every stream subscriber. Backed by the
/// same event store used for durable history, so a broadcast is also
/// recorded.
pub struct InMemoryBroadcaster {
    events: std::sync::Arc<InMemoryEventStore>,
}

impl InMemoryBroadcaster {
    pub fn new(events: std::sync::Arc<InMemoryEventStore>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl Broadcaster for InMemoryBroadcaster {
    async fn emit(&self, stream: &str, message: &str) -> anyhow::Result<()> {
        let event = Event {
            id: ulid::Ulid::new().to_string(),
            timestamp: chrono::Utc::now(),
            actor: crate::services::Actor {
                kind: "broadcaster".to_string(),
                id: stream.to_string(),
            },
            payload: serde_json::json!({ "message": message }),
        };
        self.events.append(stream, event).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn authorizer_grants_and_revokes() {
        let authorizer = InMemoryAuthorizer::new();
        assert!(!authorizer.check("char:1", "execute", "admin.manage").await.expect("ok"));
        authorizer.grant("char:1", "admin.manage");
        assert!(authorizer.check("char:1", "execute", "admin.manage").await.expect("ok"));
        authorizer.revoke("char:1", "admin.manage");
        assert!(!authorizer.check("char:1", "execute", "admin.manage").await.expect("ok"));
    }

    #[tokio::test]
    async fn policy_engine_mirrors_authorizer_grants() {
        let authorizer = InMemoryAuthorizer::new();
        authorizer.grant("char:1", "admin.ratelimit.bypass");
        let decision = authorizer
            .decide("char:1", "execute", "admin.ratelimit.bypass")
            .await
            .expect("ok");
        assert!(decision.is_allowed());
    }

    #[tokio::test]
    async fn event_store_append_and_replay() {
        let store = InMemoryEventStore::new();
        let event = Event {
            id: "01".to_string(),
            timestamp: chrono::Utc::now(),
            actor: crate::services::Actor {
                kind: "system".to_string(),
                id: "system".to_string(),
            },
            payload: serde_json::json!({"message": "hi"}),
        };
        store.append("room:1", event).await.expect("ok");
        assert_eq!(store.last_event_id("room:1").await.expect("ok"), Some("01".to_string()));
        assert_eq!(store.replay("room:1", None).await.expect("ok").len(), 1);
        assert!(store.replay("room:2", None).await.expect("ok").is_empty());
    }

    #[tokio::test]
    async fn broadcaster_records_through_event_store() {
        let store = std::sync::Arc::new(InMemoryEventStore::new());
        let broadcaster = InMemoryBroadcaster::new(store.clone());
        broadcaster.emit("room:1", "hello").await.expect("ok");
        assert_eq!(store.replay("room:1", None).await.expect("ok").len(), 1);
    }
}
