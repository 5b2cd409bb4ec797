// SPDX-License-Identifier: AGPL-3.0-or-later

//! External collaborator interfaces. The dispatch core depends only on
//! these traits, never on a concrete world, auth, or transport
//! implementation -- mirroring how the teacher codebase isolates the iSCSI
//! wire layer behind `client::client::Client` rather than calling socket
//! primitives directly from handlers.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use ulid::Ulid;

use crate::{
    errors::DispatchError,
    ids::{CharacterId, PlayerId, SessionId},
};

pub const EXECUTE_ACTION: &str = "execute";

/// Checks `(subject, action, resource)` triples. The dispatcher always
/// calls this with `action = "execute"`; `resource` is either a
/// capability name or [`crate::ratelimit::BYPASS_CAPABILITY`].
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn check(&self, subject: &str, action: &str, resource: &str)
    -> Result<bool, DispatchError>;
}

/// The outcome of a policy-engine evaluation in the middleware rate-limit
/// variant (see [`crate::middleware`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// An authorization-policy-engine trait usable in place of a pure
/// predicate; see [`crate::middleware`].
#[async_trait]
pub trait PolicyEngine: Send + Sync {
    async fn decide(
        &self,
        subject: &str,
        action: &str,
        resource: &str,
    ) -> Result<Decision, DispatchError>;
}

/// Facts about one live session, as tracked by whatever owns the
/// session's connection.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub player: PlayerId,
    pub character: Option<CharacterId>,
}

/// Session-scoped facts the dispatcher needs but does not own. Used only
/// by handlers via the services bundle, not by the dispatcher itself.
#[async_trait]
pub trait SessionService: Send + Sync {
    async fn list_active(&self) -> anyhow::Result<Vec<SessionId>>;
    async fn get_session(&self, session: SessionId) -> anyhow::Result<Option<SessionInfo>>;
    async fn end_session(&self, session: SessionId) -> anyhow::Result<()>;
}

/// The actor that produced an [`Event`]. System-originated events (see
/// [`Services::broadcast_system`]) always use `kind = "system"`.
#[derive(Debug, Clone, Serialize)]
pub struct Actor {
    pub kind: String,
    pub id: String,
}

/// A single durable, ULID-stamped fact appended to a stream's event log.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub actor: Actor,
    pub payload: serde_json::Value,
}

/// Durable, append-only record of stream events, for audit or replay.
/// Distinct from metrics: this is a write-ahead log of "what happened,"
/// not a counter.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, stream: &str, event: Event) -> anyhow::Result<String>;
    async fn replay(&self, stream: &str, since: Option<&str>) -> anyhow::Result<Vec<Event>>;
    async fn last_event_id(&self, stream: &str) -> anyhow::Result<Option<String>>;
    async fn subscribe(
        &self,
        stream: &str,
    ) -> anyhow::Result<tokio::sync::mpsc::Receiver<Event>>;
}

/// Delivers a message to every subscriber of a named stream. The
/// dispatcher never writes to a socket itself; handlers call back through
/// this trait, same as the teacher's handlers return PDUs for `Client` to
/// serialize and send.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn emit(&self, stream: &str, message: &str) -> anyhow::Result<()>;
}

/// The immutable bundle of external collaborators handed to every
/// execution context, shared via `Arc` across concurrent dispatches.
pub struct Services {
    pub authorizer: Arc<dyn Authorizer>,
    pub sessions: Arc<dyn SessionService>,
    pub events: Arc<dyn EventStore>,
    pub broadcaster: Arc<dyn Broadcaster>,
}

impl Services {
    pub fn new(
        authorizer: Arc<dyn Authorizer>,
        sessions: Arc<dyn SessionService>,
        events: Arc<dyn EventStore>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self {
            authorizer,
            sessions,
            events,
            broadcaster,
        }
    }

    /// Wraps `message` in a timestamped, ULID-stamped system event and
    /// emits it on `stream`.
    pub async fn broadcast_system(&self, stream: &str, message: &str) -> anyhow::Result<()> {
        let event = Event {
            id: Ulid::new().to_string(),
            timestamp: chrono::Utc::now(),
            actor: Actor {
                kind: "system".to_string(),
                id: "system".to_string(),
            },
            payload: json!({ "message": message }),
        };
        let serialized = serde_json::to_string(&event)?;
        self.broadcaster.emit(stream, &serialized).await
    }
}

/// Everything a single command invocation needs, threaded through the
/// registered handler. Built fresh by the dispatcher for each call;
/// `args` and `invoked_as` are filled in before the handler runs.
pub struct ExecutionContext {
    pub character: CharacterId,
    pub location: Option<String>,
    pub character_name: Option<String>,
    pub player: PlayerId,
    pub session: SessionId,
    pub args: String,
    /// The literal first token as typed, before alias expansion.
    pub invoked_as: String,
    /// Direct reply channel to this session, distinct from broadcasting
    /// to a shared stream.
    pub writer: Arc<dyn Broadcaster>,
    pub services: Arc<Services>,
}

impl ExecutionContext {
    /// The subject string every authorization check is performed against.
    pub fn subject(&self) -> String {
        format!("char:{}", self.character)
    }
}
