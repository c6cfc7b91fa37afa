//! ---
//! docqa_section: "06-security-access-control"
//! docqa_subsection: "module"
//! docqa_type: "source"
//! docqa_scope: "code"
//! docqa_description: "Authorization policy core and identity utilities."
//! docqa_version: "v0.1.0-alpha"
//! docqa_owner: "tbd"
//! ---
use prometheus::{IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Arc;

use crate::policy::{Decision, Rule, Verdict};

/// Authorization metrics exported via Prometheus.
#[derive(Clone)]
pub struct AuthzMetrics {
    registry: Arc<Registry>,
    decisions_total: IntCounterVec,
    denials_total: IntCounter,
    auth_failures_total: IntCounter,
    role_mutations_total: IntCounterVec,
}

impl AuthzMetrics {
    /// Register metrics with the provided registry.
    pub fn new(registry: Arc<Registry>) -> anyhow::Result<Self> {
        let decisions_total = IntCounterVec::new(
            Opts::new("authz_decisions_total", "Authorization decisions by outcome and rule"),
            &["outcome", "rule"],
        )?;
        let denials_total =
            IntCounter::new("authz_denials_total", "Requests rejected by the policy")?;
        let auth_failures_total =
            IntCounter::new("auth_failures_total", "Failed bearer token authentications")?;
        let role_mutations_total = IntCounterVec::new(
            Opts::new("role_mutations_total", "Applied role-management operations"),
            &["operation"],
        )?;

        registry.register(Box::new(decisions_total.clone()))?;
        registry.register(Box::new(denials_total.clone()))?;
        registry.register(Box::new(auth_failures_total.clone()))?;
        registry.register(Box::new(role_mutations_total.clone()))?;

        Ok(Self {
            registry,
            decisions_total,
            denials_total,
            auth_failures_total,
            role_mutations_total,
        })
    }

    /// Access the underlying registry.
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Count an allowing verdict.
    pub fn observe_verdict(&self, verdict: &Verdict) {
        self.decisions_total
            .with_label_values(&[verdict.decision.as_ref(), verdict.rule.as_ref()])
            .inc();
    }

    /// Count a denial.
    pub fn inc_denial(&self) {
        self.decisions_total
            .with_label_values(&[Decision::Deny.as_ref(), Rule::NoMatch.as_ref()])
            .inc();
        self.denials_total.inc();
    }

    /// Increment authentication failures.
    pub fn inc_auth_failure(&self) {
        self.auth_failures_total.inc();
    }

    /// Count an applied role mutation (`create`, `delete`, `assign`, `remove`).
    pub fn inc_role_mutation(&self, operation: &str) {
        self.role_mutations_total
            .with_label_values(&[operation])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::AuthorizationGate;
    use crate::model::{Action, Actor, Resource, ResourceType};

    #[test]
    fn metrics_increment() {
        let registry = Arc::new(Registry::new());
        let metrics = AuthzMetrics::new(registry.clone()).unwrap();
        let gate = AuthorizationGate::builtin();
        let verdict = gate
            .authorize(&Actor::admin("root"), Action::Delete, &Resource::of_type(ResourceType::Document))
            .unwrap();
        metrics.observe_verdict(&verdict);
        metrics.inc_denial();
        metrics.inc_auth_failure();
        metrics.inc_role_mutation("assign");
        assert_eq!(registry.gather().len(), 4);
        assert_eq!(
            metrics
                .decisions_total
                .with_label_values(&["ALLOW", "admin-override"])
                .get(),
            1
        );
        assert_eq!(metrics.denials_total.get(), 1);
    }

    #[test]
    fn denials_share_the_no_match_series() {
        let metrics = AuthzMetrics::new(Arc::new(Registry::new())).unwrap();
        let gate = AuthorizationGate::builtin();
        let verdict = gate.evaluator().explain(
            &Actor::new("alice"),
            Action::Delete,
            &Resource::of_type(ResourceType::Document),
        );
        metrics.observe_verdict(&verdict);
        metrics.inc_denial();
        assert_eq!(
            metrics
                .decisions_total
                .with_label_values(&["DENY", "no-match"])
                .get(),
            2
        );
    }
}
