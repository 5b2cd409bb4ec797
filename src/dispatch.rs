// SPDX-License-Identifier: AGPL-3.0-or-later

//! The command dispatch pipeline: parse, expand aliases, rate-limit,
//! look up the registry, authorize, and invoke the handler. Mirrors the
//! shape of the teacher's `Client` request/response loop -- a thin
//! orchestrator over collaborators it does not own -- but the stages
//! here are alias/rate-limit/registry/authz rather than PDU framing.

use std::{sync::Arc, time::Instant};

use tracing::Instrument;

use crate::{
    alias::AliasCache,
    errors::DispatchError,
    parser::parse_line,
    ratelimit::{BYPASS_CAPABILITY, RateLimiter},
    registry::Registry,
    services::{Authorizer, EXECUTE_ACTION, ExecutionContext},
    telemetry::Telemetry,
};

pub struct Dispatcher {
    registry: Arc<Registry>,
    authorizer: Arc<dyn Authorizer>,
    telemetry: Arc<Telemetry>,
    aliases: Option<Arc<AliasCache>>,
    rate_limiter: Option<Arc<RateLimiter>>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<Registry>,
        authorizer: Arc<dyn Authorizer>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            registry,
            authorizer,
            telemetry,
            aliases: None,
            rate_limiter: None,
        }
    }

    pub fn with_aliases(mut self, aliases: Arc<AliasCache>) -> Self {
        self.aliases = Some(aliases);
        self
    }

    pub fn with_rate_limiter(mut self, rate_limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(rate_limiter);
        self
    }

    /// Runs the full pipeline for one line of player input. `ctx.args`
    /// and `ctx.invoked_as` are overwritten; every other field must
    /// already be populated by the caller.
    pub async fn dispatch(&self, mut ctx: ExecutionContext, raw: &str) -> Result<(), DispatchError> {
        if ctx.character.is_nil() {
            return Err(DispatchError::NoCharacter);
        }

        let captured = parse_line(raw)?;
        ctx.invoked_as = captured.name;

        let mut working_input = raw.to_string();
        let mut alias_used: Option<String> = None;

        if let Some(aliases) = &self.aliases {
            let resolved = aliases.resolve(ctx.player, raw, Some(&self.registry));
            if resolved.was_alias {
                ctx.invoked_as = resolved.alias_used.clone();
                working_input = resolved.resolved;
                self.telemetry.record_alias_expansion(&resolved.alias_used);
                alias_used = Some(resolved.alias_used);
            }
        }

        let parsed = parse_line(&working_input)?;

        let span = tracing::info_span!(
            "command.execute",
            command.name = %parsed.name,
            character.id = %ctx.character,
            command.alias_expanded = alias_used.is_some(),
            command.original_input = tracing::field::Empty,
            command.alias_used = tracing::field::Empty,
            command.rate_limited = tracing::field::Empty,
            command.cooldown_ms = tracing::field::Empty,
        );
        if let Some(alias) = &alias_used {
            span.record("command.original_input", raw);
            span.record("command.alias_used", alias.as_str());
        }

        let outcome = self
            .run_stages(&mut ctx, parsed, &span)
            .instrument(span.clone())
            .await;

        if let Err(err) = &outcome {
            tracing::warn!(parent: &span, error = %err, "dispatch failed");
        }

        outcome
    }

    async fn run_stages(
        &self,
        ctx: &mut ExecutionContext,
        parsed: crate::parser::ParsedLine,
        span: &tracing::Span,
    ) -> Result<(), DispatchError> {
        let subject = ctx.subject();

        if let Some(limiter) = &self.rate_limiter {
            let bypass = self
                .authorizer
                .check(&subject, EXECUTE_ACTION, BYPASS_CAPABILITY)
                .await
                .unwrap_or(false);

            if !bypass {
                if let Err(err) = limiter.allow(ctx.session) {
                    if let DispatchError::RateLimited { cooldown_ms } = &err {
                        span.record("command.rate_limited", true);
                        span.record("command.cooldown_ms", *cooldown_ms);
                    }
                    self.telemetry
                        .record_command(&parsed.name, "", "rate_limited");
                    return Err(err);
                }
            }
        }

        let entry = match self.registry.get(&parsed.name) {
            Some(entry) => entry,
            None => {
                self.telemetry.record_command(&parsed.name, "", "not_found");
                return Err(DispatchError::UnknownCommand {
                    command: parsed.name,
                });
            },
        };

        for capability in entry.capabilities() {
            let allowed = self
                .authorizer
                .check(&subject, EXECUTE_ACTION, &capability)
                .await?;
            if !allowed {
                self.telemetry
                    .record_command(&parsed.name, &entry.source, "permission_denied");
                return Err(DispatchError::PermissionDenied {
                    command: parsed.name,
                    capability,
                });
            }
        }

        ctx.args = parsed.args;

        let start = Instant::now();
        let result = entry.invoke(ctx).await;
        let elapsed = start.elapsed().as_secs_f64();

        match &result {
            Ok(()) => {
                self.telemetry
                    .record_command(&parsed.name, &entry.source, "success");
            },
            Err(err) => {
                tracing::warn!(
                    command = %parsed.name,
                    character = %ctx.character,
                    error = %err,
                    "handler returned an error"
                );
                self.telemetry
                    .record_command(&parsed.name, &entry.source, "error");
            },
        }
        self.telemetry
            .record_duration(&parsed.name, &entry.source, elapsed);

        result
    }
}
