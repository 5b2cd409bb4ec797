// SPDX-License-Identifier: AGPL-3.0-or-later

//! Prometheus metrics for the dispatch pipeline. A single [`Telemetry`]
//! instance owns its own [`Registry`](prometheus::Registry) rather than
//! reaching for the global default, so a server embedding this crate can
//! merge it into its own `/metrics` endpoint without collisions.

use prometheus::{
    Counter, CounterVec, HistogramVec, Opts, Registry, exponential_buckets,
    register_counter_vec_with_registry, register_counter_with_registry,
    register_histogram_vec_with_registry,
};

pub struct Telemetry {
    registry: Registry,
    /// `{command, source, status}`, status one of success/error/not_found/
    /// permission_denied/rate_limited.
    pub commands_total: CounterVec,
    /// `{command, source}`, seconds.
    pub command_duration_seconds: HistogramVec,
    /// `{alias}`, incremented once per dispatch whose resolver reports an
    /// expansion.
    pub alias_expansions_total: CounterVec,
    /// Unlabeled: a cycle-rejected alias write whose rollback itself
    /// failed, signifying persistent-store/cache divergence.
    pub alias_rollback_failures_total: Counter,
}

impl Telemetry {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let commands_total = register_counter_vec_with_registry!(
            Opts::new("dispatch_commands_total", "Commands processed by outcome"),
            &["command", "source", "status"],
            registry
        )?;

        let command_duration_seconds = register_histogram_vec_with_registry!(
            "dispatch_command_duration_seconds",
            "Time spent executing a command handler",
            &["command", "source"],
            exponential_buckets(0.0005, 2.0, 14)?,
            registry
        )?;

        let alias_expansions_total = register_counter_vec_with_registry!(
            Opts::new("dispatch_alias_expansions_total", "Alias expansions performed"),
            &["alias"],
            registry
        )?;

        let alias_rollback_failures_total = register_counter_with_registry!(
            Opts::new(
                "dispatch_alias_rollback_failures_total",
                "Cycle-rejected alias writes where the previous binding could not be restored"
            ),
            registry
        )?;

        Ok(Self {
            registry,
            commands_total,
            command_duration_seconds,
            alias_expansions_total,
            alias_rollback_failures_total,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_command(&self, command: &str, source: &str, status: &str) {
        self.commands_total
            .with_label_values(&[command, source, status])
            .inc();
    }

    pub fn record_duration(&self, command: &str, source: &str, elapsed_secs: f64) {
        self.command_duration_seconds
            .with_label_values(&[command, source])
            .observe(elapsed_secs);
    }

    pub fn record_alias_expansion(&self, alias: &str) {
        self.alias_expansions_total.with_label_values(&[alias]).inc();
    }

    pub fn record_alias_rollback_failure(&self) {
        self.alias_rollback_failures_total.inc();
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new().expect("static metric descriptors are well-formed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_without_panicking() {
        let telemetry = Telemetry::new().expect("valid");
        telemetry.record_command("look", "core", "success");
        telemetry.record_duration("look", "core", 0.001);
        telemetry.record_alias_expansion("l");
        telemetry.record_alias_rollback_failure();
        let families = telemetry.registry().gather();
        assert!(!families.is_empty());
    }
}
