//! The built-in domain experts.
//!
//! | Expert | Authority | Routes on |
//! |---|---|---|
//! | [`IoExpert`] | Primary | I/O points and channels |
//! | [`SystemExpert`] | Secondary | CPU, memory, real-time |
//! | [`CommunicationExpert`] | Secondary | protocols, interfaces, network |
//!
//! Every expert parses the raw requirement, keeps the constraints of its category,
//! validates them and proposes one `processed` entry per key plus a
//! `validated/<category>.compatibility` verdict.

mod communication;
mod io;
mod system;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use concord_blackboard::{AuthorityLevel, BlackboardView, ConflictRecord, Proposal};
use concord_core::{AgentId, ResultExt};
use tracing::{debug, info};

pub use communication::CommunicationExpert;
pub use io::IoExpert;
pub use system::SystemExpert;

use crate::agent::Agent;
use crate::collaborators::{
    CompatibilityReport, Constraint, ConstraintCategory, ConstraintValue, ParsedRequirement,
    Toolkit,
};
use crate::error::{Error, Result};

pub const PROCESSED_SPACE: &str = "processed";
pub const VALIDATED_SPACE: &str = "validated";

/// The three default experts sharing one toolkit, in registration order.
#[must_use]
pub fn default_experts(toolkit: &Toolkit) -> Vec<Arc<dyn Agent>> {
    vec![
        Arc::new(IoExpert::new(toolkit.clone())),
        Arc::new(SystemExpert::new(toolkit.clone())),
        Arc::new(CommunicationExpert::new(toolkit.clone())),
    ]
}

/// What an expert extracted for its category.
pub(crate) struct Analysis {
    pub parsed: ParsedRequirement,
    pub constraints: Vec<Constraint>,
    pub report: CompatibilityReport,
}

/// Parse, filter and check the view's requirement for one category.
pub(crate) fn analyse(
    toolkit: &Toolkit,
    view: &BlackboardView,
    category: ConstraintCategory,
) -> Result<Analysis> {
    let requirement = view
        .requirement()
        .ok_or_else(|| Error::agent_failed(view.agent(), "no requirement on the blackboard"))?;

    let parsed = toolkit.parser.parse(&requirement);
    let constraints: Vec<Constraint> = parsed.in_category(category).cloned().collect();
    let report = toolkit.checker.check(&constraints);

    debug!(
        agent_id = %view.agent(),
        category = %category,
        constraints = constraints.len(),
        valid = report.is_valid(),
        "Analysed requirement"
    );

    // Kept for the agent's own later inspection; never shared.
    if let Some(json) =
        serde_json::to_value(&constraints).into_option_logged("Constraints not kept in scratch")
    {
        view.scratch().put(format!("{category}.constraints"), json);
    }

    Ok(Analysis {
        parsed,
        constraints,
        report,
    })
}

/// Fold constraint values per key: counts and amounts keep the maximum, flags are
/// or-ed, names collect into a sorted list.
pub(crate) fn fold_values<'a>(
    constraints: impl IntoIterator<Item = &'a Constraint>,
) -> BTreeMap<String, serde_json::Value> {
    let mut numbers: BTreeMap<&str, ConstraintValue> = BTreeMap::new();
    let mut names: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();

    for constraint in constraints {
        let key = constraint.key.as_str();
        match &constraint.value {
            ConstraintValue::Name(name) => {
                names.entry(key).or_default().insert(name.as_str());
            }
            value => {
                numbers
                    .entry(key)
                    .and_modify(|current| *current = larger(current, value))
                    .or_insert_with(|| value.clone());
            }
        }
    }

    numbers
        .into_iter()
        .map(|(key, value)| (key.to_string(), value.to_json()))
        .chain(
            names
                .into_iter()
                .map(|(key, set)| (key.to_string(), serde_json::json!(set))),
        )
        .collect()
}

fn larger(current: &ConstraintValue, candidate: &ConstraintValue) -> ConstraintValue {
    match (current, candidate) {
        (ConstraintValue::Flag(a), ConstraintValue::Flag(b)) => ConstraintValue::Flag(*a || *b),
        _ => match (current.as_f64(), candidate.as_f64()) {
            (Some(a), Some(b)) if b > a => candidate.clone(),
            _ => current.clone(),
        },
    }
}

/// Proposal builder bound to one agent and basis.
pub(crate) struct Proposer<'a> {
    agent: &'a AgentId,
    authority: AuthorityLevel,
    view: &'a BlackboardView,
}

impl<'a> Proposer<'a> {
    pub(crate) const fn new(
        agent: &'a AgentId,
        authority: AuthorityLevel,
        view: &'a BlackboardView,
    ) -> Self {
        Self {
            agent,
            authority,
            view,
        }
    }

    pub(crate) fn propose(
        &self,
        space: &str,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Proposal {
        Proposal::new(
            self.agent.clone(),
            self.authority,
            space,
            key,
            value,
            self.view.basis().clone(),
        )
    }

    /// One `processed` proposal per folded key.
    pub(crate) fn processed(&self, values: BTreeMap<String, serde_json::Value>) -> Vec<Proposal> {
        values
            .into_iter()
            .map(|(key, value)| self.propose(PROCESSED_SPACE, key, value))
            .collect()
    }

    /// The `validated/<category>.compatibility` verdict.
    pub(crate) fn verdict(
        &self,
        category: ConstraintCategory,
        report: &CompatibilityReport,
    ) -> Proposal {
        self.propose(
            VALIDATED_SPACE,
            format!("{category}.compatibility"),
            report.to_json(),
        )
    }
}

/// Veto bookkeeping for Secondary experts.
#[derive(Debug, Default)]
pub(crate) struct VetoLog {
    count: AtomicUsize,
}

impl VetoLog {
    pub(crate) fn record(&self, agent: &AgentId, vetoed: &Proposal, record: &ConflictRecord) {
        self.count.fetch_add(1, Ordering::Relaxed);
        info!(
            agent_id = %agent,
            space = %vetoed.target_space,
            key = %vetoed.key,
            winner = ?record.winner,
            "Proposal vetoed"
        );
    }

    pub(crate) fn count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constraint(key: &str, value: ConstraintValue) -> Constraint {
        Constraint::new(ConstraintCategory::Io, key, value, "s")
    }

    #[test]
    fn test_fold_values_per_kind() {
        let folded = fold_values(&[
            constraint("a", ConstraintValue::Count(8)),
            constraint("a", ConstraintValue::Count(16)),
            constraint("a", ConstraintValue::Count(4)),
            constraint("b", ConstraintValue::Name("profinet".into())),
            constraint("b", ConstraintValue::Name("modbus_rtu".into())),
            constraint("b", ConstraintValue::Name("profinet".into())),
            constraint("c", ConstraintValue::Flag(true)),
            constraint("d", ConstraintValue::Amount(1500.0)),
        ]);

        assert_eq!(folded.get("a"), Some(&serde_json::json!(16)));
        assert_eq!(
            folded.get("b"),
            Some(&serde_json::json!(["modbus_rtu", "profinet"]))
        );
        assert_eq!(folded.get("c"), Some(&serde_json::json!(true)));
        assert_eq!(folded.get("d"), Some(&serde_json::json!(1500)));
    }

    #[test]
    fn test_default_experts_order_and_authority() {
        let experts = default_experts(&Toolkit::default());
        let ids: Vec<_> = experts.iter().map(|a| a.id().as_str().to_string()).collect();
        assert_eq!(ids, vec!["io_expert", "system_expert", "communication_expert"]);
        assert_eq!(
            experts.first().map(|a| a.authority()),
            Some(AuthorityLevel::Primary)
        );
    }
}
