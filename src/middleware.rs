// SPDX-License-Identifier: AGPL-3.0-or-later

//! An alternative packaging of rate limiting as a pluggable middleware,
//! for callers that already have a centralized authorization-policy
//! engine and want the bypass decision to go through it instead of a
//! direct capability predicate on [`crate::services::Authorizer`].

use std::sync::Arc;

use crate::{
    errors::DispatchError,
    ids::SessionId,
    ratelimit::{BYPASS_CAPABILITY, RateLimiter},
    services::{EXECUTE_ACTION, PolicyEngine},
};

/// Pairs a policy engine with a rate limiter. Absent entirely (`Option<
/// RateLimitMiddleware>` at the call site), it is a safe no-op: dispatch
/// proceeds without rate limiting, identical to never installing a
/// limiter at all.
pub struct RateLimitMiddleware {
    policy: Arc<dyn PolicyEngine>,
    limiter: Arc<RateLimiter>,
}

impl RateLimitMiddleware {
    pub fn new(policy: Arc<dyn PolicyEngine>, limiter: Arc<RateLimiter>) -> Self {
        Self { policy, limiter }
    }

    /// Evaluates `(subject, "execute", bypass-capability)` through the
    /// policy engine. An `Allow` decision exempts the session entirely;
    /// anything else (including an engine error) falls through to the
    /// token bucket -- fail-closed.
    pub async fn check(&self, subject: &str, session: SessionId) -> Result<(), DispatchError> {
        match self
            .policy
            .decide(subject, EXECUTE_ACTION, BYPASS_CAPABILITY)
            .await
        {
            Ok(decision) if decision.is_allowed() => Ok(()),
            Ok(_) => self.limiter.allow(session),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    "policy engine error evaluating rate-limit bypass, failing closed"
                );
                self.limiter.allow(session)
            },
        }
    }
}

/// Runs `middleware` if installed; a `None` middleware is a no-op.
pub async fn enforce(
    middleware: Option<&RateLimitMiddleware>,
    subject: &str,
    session: SessionId,
) -> Result<(), DispatchError> {
    match middleware {
        None => Ok(()),
        Some(mw) => mw.check(subject, session).await,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::{
        ratelimit::RateLimitConfig,
        services::Decision,
    };

    struct AllowEverything;

    #[async_trait]
    impl PolicyEngine for AllowEverything {
        async fn decide(&self, _s: &str, _a: &str, _r: &str) -> Result<Decision, DispatchError> {
            Ok(Decision::Allow)
        }
    }

    struct DenyEverything;

    #[async_trait]
    impl PolicyEngine for DenyEverything {
        async fn decide(&self, _s: &str, _a: &str, _r: &str) -> Result<Decision, DispatchError> {
            Ok(Decision::Deny)
        }
    }

    struct AlwaysErrors;

    #[async_trait]
    impl PolicyEngine for AlwaysErrors {
        async fn decide(&self, _s: &str, _a: &str, _r: &str) -> Result<Decision, DispatchError> {
            Err(DispatchError::NilServices)
        }
    }

    fn tight_limiter() -> Arc<RateLimiter> {
        RateLimiter::spawn(RateLimitConfig {
            capacity: 1.0,
            refill_per_sec: 0.1,
            reap_interval: Duration::from_secs(3600),
            idle_ttl: Duration::from_secs(3600),
        })
    }

    #[tokio::test]
    async fn absent_middleware_is_a_no_op() {
        let session = SessionId::new();
        for _ in 0..10 {
            enforce(None, "char:1", session).await.expect("no-op never rejects");
        }
    }

    #[tokio::test]
    async fn allow_decision_bypasses_the_bucket_entirely() {
        let limiter = tight_limiter();
        let mw = RateLimitMiddleware::new(Arc::new(AllowEverything), limiter.clone());
        let session = SessionId::new();
        for _ in 0..5 {
            mw.check("char:1", session).await.expect("bypassed every time");
        }
        limiter.close().await;
    }

    #[tokio::test]
    async fn deny_decision_falls_through_to_the_bucket() {
        let limiter = tight_limiter();
        let mw = RateLimitMiddleware::new(Arc::new(DenyEverything), limiter.clone());
        let session = SessionId::new();
        mw.check("char:1", session).await.expect("first token available");
        let err = mw.check("char:1", session).await.unwrap_err();
        assert!(matches!(err, DispatchError::RateLimited { .. }));
        limiter.close().await;
    }

    #[tokio::test]
    async fn engine_error_fails_closed() {
        let limiter = tight_limiter();
        let mw = RateLimitMiddleware::new(Arc::new(AlwaysErrors), limiter.clone());
        let session = SessionId::new();
        mw.check("char:1", session).await.expect("first token available");
        let err = mw.check("char:1", session).await.unwrap_err();
        assert!(matches!(err, DispatchError::RateLimited { .. }));
        limiter.close().await;
    }
}
