//! Consumer-scoped bookkeeping for one configuration entry.

use std::collections::HashMap;

use sf_core::entity::StateStore;
use sf_core::numeric::Real;
use sf_core::timing::Timer;

use crate::consumer::{
    Consumer, ConsumerKind, DEFAULT_PID_DEADBAND_PCT, DEFAULT_START_DELAY_S, DEFAULT_STEP_W,
    DEFAULT_STOP_DELAY_S, DEFAULT_THRESHOLD_W,
};
use crate::feedback;
use crate::overrides::{OverrideParam, OverrideResolver};
use crate::priority::{assign_tiers, list_fingerprint, merge_priorities, priority_signature};
use crate::runtime::{ConsumerRuntime, RuntimeStore};
use crate::validate::{self, ConsumerIssue, EntityWarning, ValidationReport};

/// Read-only view of everything the manager consults.
#[derive(Clone, Copy)]
pub struct ConsumerContext<'a> {
    pub states: &'a dyn StateStore,
    pub runtime: &'a RuntimeStore,
    pub overrides: &'a dyn OverrideResolver,
}

impl<'a> ConsumerContext<'a> {
    pub fn new(
        states: &'a dyn StateStore,
        runtime: &'a RuntimeStore,
        overrides: &'a dyn OverrideResolver,
    ) -> Self {
        Self {
            states,
            runtime,
            overrides,
        }
    }
}

#[derive(Debug, Clone)]
struct PriorityCache {
    signature: String,
    priorities: Vec<Real>,
}

#[derive(Debug, Clone)]
struct LookupCache {
    fingerprint: String,
    index_by_id: HashMap<String, usize>,
}

/// Consumer bookkeeping bound to one entry.
///
/// Holds no control logic. The only state is derived caches, and those are
/// validated against content signatures of the list passed in each call.
/// Not meant to be shared between execution contexts.
#[derive(Debug, Clone)]
pub struct ConsumerManager {
    entry_id: String,
    priorities: Option<PriorityCache>,
    lookup: Option<LookupCache>,
}

impl ConsumerManager {
    pub fn new(entry_id: impl Into<String>) -> Self {
        Self {
            entry_id: entry_id.into(),
            priorities: None,
            lookup: None,
        }
    }

    pub fn entry_id(&self) -> &str {
        &self.entry_id
    }

    fn runtime(&self, consumer: &Consumer, ctx: &ConsumerContext<'_>) -> ConsumerRuntime {
        ctx.runtime.snapshot(&self.entry_id, &consumer.id)
    }

    /// Internal soft-disable flag; a consumer without id is never enabled.
    pub fn is_enabled(&self, consumer: &Consumer, ctx: &ConsumerContext<'_>) -> bool {
        if !consumer.has_id() {
            return false;
        }
        ctx.runtime
            .get(&self.entry_id, &consumer.id)
            .is_none_or(|runtime| runtime.enabled)
    }

    /// False when the power target exists in config but is missing or
    /// unavailable in the store.
    pub fn is_available(&self, consumer: &Consumer, ctx: &ConsumerContext<'_>) -> bool {
        match consumer.power_target_entity_id.as_deref() {
            Some(entity_id) => ctx.states.is_available(entity_id),
            None => true,
        }
    }

    /// Effective value of an overridable parameter.
    ///
    /// Override entity (available and numeric) wins, then the configured
    /// value, then `default`.
    pub fn number_param(
        &self,
        consumer: &Consumer,
        param: OverrideParam,
        configured: Option<Real>,
        default: Real,
        ctx: &ConsumerContext<'_>,
    ) -> Real {
        let fallback = configured.filter(|v| v.is_finite()).unwrap_or(default);
        ctx.overrides
            .lookup(&consumer.id, param)
            .and_then(|entity_id| ctx.states.number(&entity_id))
            .unwrap_or(fallback)
    }

    /// Start (`is_start`) or stop delay in seconds.
    pub fn delay_seconds(
        &self,
        consumer: &Consumer,
        is_start: bool,
        ctx: &ConsumerContext<'_>,
    ) -> Real {
        if is_start {
            self.number_param(
                consumer,
                OverrideParam::StartDelay,
                consumer.start_delay_s,
                DEFAULT_START_DELAY_S,
                ctx,
            )
        } else {
            self.number_param(
                consumer,
                OverrideParam::StopDelay,
                consumer.stop_delay_s,
                DEFAULT_STOP_DELAY_S,
                ctx,
            )
        }
    }

    pub fn step_w(&self, consumer: &Consumer, ctx: &ConsumerContext<'_>) -> Real {
        self.number_param(consumer, OverrideParam::Step, consumer.step_w, DEFAULT_STEP_W, ctx)
    }

    pub fn pid_deadband_pct(&self, consumer: &Consumer, ctx: &ConsumerContext<'_>) -> Real {
        self.number_param(
            consumer,
            OverrideParam::DeadbandPct,
            consumer.pid_deadband_pct,
            DEFAULT_PID_DEADBAND_PCT,
            ctx,
        )
    }

    pub fn threshold_w(&self, consumer: &Consumer, ctx: &ConsumerContext<'_>) -> Real {
        self.number_param(
            consumer,
            OverrideParam::Threshold,
            consumer.threshold_w,
            DEFAULT_THRESHOLD_W,
            ctx,
        )
    }

    /// Physical on/off state from `state_entity_id`; `None` when not
    /// configured, missing, unavailable or unparseable.
    pub fn read_physical_device_state(
        &self,
        consumer: &Consumer,
        ctx: &ConsumerContext<'_>,
    ) -> Option<bool> {
        let entity_id = consumer.state_entity_id.as_deref()?;
        feedback::device_on(&ctx.states.get(entity_id)?)
    }

    /// Actual power from `power_target_entity_id`.
    pub fn read_physical_device_power(
        &self,
        consumer: &Consumer,
        ctx: &ConsumerContext<'_>,
    ) -> Option<Real> {
        let entity_id = consumer.power_target_entity_id.as_deref()?;
        feedback::device_power(&ctx.states.get(entity_id)?)
    }

    /// Whether a start has completed.
    ///
    /// Controlled: device on and power at max per `is_at_max(power, max)`.
    /// Binary: device on. Without physical state the last commanded runtime
    /// values decide; without a power reading the commanded power is used.
    pub fn is_consumer_finished_starting(
        &self,
        consumer: &Consumer,
        ctx: &ConsumerContext<'_>,
        is_at_max: impl Fn(Real, Real) -> bool,
    ) -> bool {
        if !consumer.has_id() {
            return false;
        }
        let max_power = consumer.max_power_value();

        match self.read_physical_device_state(consumer, ctx) {
            None => {
                let runtime = self.runtime(consumer, ctx);
                if consumer.is_controlled() {
                    is_at_max(runtime.cmd_w, max_power)
                } else {
                    runtime.is_on
                }
            }
            Some(false) => false,
            Some(true) if consumer.is_controlled() => {
                match self.read_physical_device_power(consumer, ctx) {
                    Some(actual) if max_power > 0.0 => is_at_max(actual, max_power),
                    _ => is_at_max(self.runtime(consumer, ctx).cmd_w, max_power),
                }
            }
            Some(true) => true,
        }
    }

    /// Whether a stop has completed: device off, or with unknown physical
    /// state, nothing commanded. A consumer without id counts as stopped.
    pub fn is_consumer_finished_stopping(
        &self,
        consumer: &Consumer,
        ctx: &ConsumerContext<'_>,
    ) -> bool {
        if let Some(on) = self.read_physical_device_state(consumer, ctx) {
            return !on;
        }
        if !consumer.has_id() {
            return true;
        }
        let runtime = self.runtime(consumer, ctx);
        match consumer.kind {
            ConsumerKind::Controlled => runtime.cmd_w <= 0.0,
            _ => !runtime.is_on,
        }
    }

    /// Store a status string for the consumer (empty for none).
    pub fn set_consumer_reason(
        &self,
        runtime: &mut RuntimeStore,
        consumer_id: &str,
        reason: Option<&str>,
    ) {
        let record = runtime.get_mut(&self.entry_id, consumer_id);
        record.reason = reason.unwrap_or_default().to_string();
    }

    /// Content signature over `(id, enabled, priority)` of the list.
    pub fn consumers_signature(&self, consumers: &[Consumer], ctx: &ConsumerContext<'_>) -> String {
        priority_signature(consumers.iter().filter(|c| c.has_id()).map(|c| {
            (c.id.as_str(), self.is_enabled(c, ctx), c.priority_value())
        }))
    }

    /// Distinct priority tiers among enabled consumers, ascending.
    ///
    /// Priorities within [`PRIORITY_TOLERANCE`](crate::PRIORITY_TOLERANCE)
    /// share a tier; non-positive priorities are skipped. With `use_cache`
    /// the previous result is returned while the list signature is
    /// unchanged; every recomputation refreshes the cache.
    pub fn collect_enabled_priorities(
        &mut self,
        consumers: &[Consumer],
        ctx: &ConsumerContext<'_>,
        use_cache: bool,
    ) -> Vec<Real> {
        let signature = self.consumers_signature(consumers, ctx);
        if use_cache {
            if let Some(cache) = self.priorities.as_ref().filter(|c| c.signature == signature) {
                tracing::debug!(priorities = ?cache.priorities, "using cached enabled priorities");
                return cache.priorities.clone();
            }
        }

        let timer = Timer::start("collect_enabled_priorities");
        let priorities = merge_priorities(
            consumers
                .iter()
                .filter(|c| self.is_enabled(c, ctx))
                .map(Consumer::priority_value),
        );
        timer.stop_and_log(consumers.len());

        self.priorities = Some(PriorityCache {
            signature,
            priorities: priorities.clone(),
        });
        priorities
    }

    /// Enabled consumers belonging to the tier opened by `tier`.
    ///
    /// Membership follows the same assignment as
    /// [`collect_enabled_priorities`](Self::collect_enabled_priorities), so
    /// every enabled consumer lands in exactly one tier.
    pub fn consumers_in_tier<'c>(
        &self,
        consumers: &'c [Consumer],
        ctx: &ConsumerContext<'_>,
        tier: Real,
    ) -> Vec<&'c Consumer> {
        let enabled: Vec<&Consumer> = consumers
            .iter()
            .filter(|c| self.is_enabled(c, ctx))
            .collect();
        let assigned = assign_tiers(enabled.iter().map(|c| c.priority_value()));
        enabled
            .into_iter()
            .zip(assigned)
            .filter(|(_, assigned)| *assigned == Some(tier))
            .map(|(consumer, _)| consumer)
            .collect()
    }

    /// Forget every derived cache.
    pub fn invalidate_cache(&mut self) {
        self.priorities = None;
        self.lookup = None;
    }

    pub fn validate_consumers(&self, consumers: &[Consumer]) -> ValidationReport<ConsumerIssue> {
        validate::validate_consumers(consumers)
    }

    pub fn validate_entity_accessibility(
        &self,
        consumers: &[Consumer],
        ctx: &ConsumerContext<'_>,
    ) -> ValidationReport<EntityWarning> {
        validate::validate_entity_accessibility(consumers, ctx.states)
    }

    /// Look a consumer up by id.
    ///
    /// The id index is cached per list fingerprint, so a list rebuilt from
    /// config with different content always gets a fresh index.
    pub fn get_consumer_by_id<'c>(
        &mut self,
        consumers: &'c [Consumer],
        consumer_id: &str,
    ) -> Option<&'c Consumer> {
        let fingerprint = list_fingerprint(consumers);
        let stale = self
            .lookup
            .as_ref()
            .is_none_or(|cache| cache.fingerprint != fingerprint);
        if stale {
            let mut index_by_id = HashMap::with_capacity(consumers.len());
            for (index, consumer) in consumers.iter().enumerate() {
                index_by_id.entry(consumer.id.clone()).or_insert(index);
            }
            self.lookup = Some(LookupCache {
                fingerprint,
                index_by_id,
            });
        }

        let index = *self.lookup.as_ref()?.index_by_id.get(consumer_id)?;
        consumers.get(index).filter(|c| c.id == consumer_id)
    }
}
