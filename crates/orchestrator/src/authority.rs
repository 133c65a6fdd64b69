//! Authority/veto resolution of competing proposals.
//!
//! Per `(space, key)`: a Primary proposal beats every Secondary one regardless of
//! clocks. Among equals the higher weight wins, then the earlier registration.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use concord_blackboard::{AuthorityLevel, ConflictReason, ConflictRecord, Proposal};
use concord_core::AgentId;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Priority weight and registration position of every agent.
#[derive(Debug, Clone, Default)]
pub struct Ranking {
    entries: HashMap<AgentId, (u32, usize)>,
}

impl Ranking {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `agent` after every agent registered so far. Re-registering keeps the
    /// original position and updates the weight.
    pub fn register(&mut self, agent: &AgentId, weight: u32) {
        let next = self.entries.len();
        self.entries
            .entry(agent.clone())
            .and_modify(|(w, _)| *w = weight)
            .or_insert((weight, next));
    }

    /// Weight of `agent`; unknown agents weigh nothing.
    #[must_use]
    pub fn weight(&self, agent: &AgentId) -> u32 {
        self.entries.get(agent).map_or(0, |(w, _)| *w)
    }

    /// Registration position; unknown agents sort last.
    #[must_use]
    pub fn position(&self, agent: &AgentId) -> usize {
        self.entries.get(agent).map_or(usize::MAX, |(_, p)| *p)
    }

    fn rank(&self, proposal: &Proposal) -> (u8, Reverse<u32>, usize) {
        let authority = match proposal.authority {
            AuthorityLevel::Primary => 0,
            AuthorityLevel::Secondary => 1,
        };
        (
            authority,
            Reverse(self.weight(&proposal.agent_id)),
            self.position(&proposal.agent_id),
        )
    }
}

/// Winners to commit and a record for every losing proposal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// One proposal per `(space, key)`, ordered by space then key.
    pub winners: Vec<Proposal>,
    pub conflicts: Vec<ConflictRecord>,
}

/// Resolve proposals into one winner per `(space, key)`.
///
/// A repeated proposal from the same agent for the same key replaces its earlier one.
#[must_use]
pub fn resolve(proposals: Vec<Proposal>, ranking: &Ranking) -> Resolution {
    let mut slots: BTreeMap<(String, String), Vec<Proposal>> = BTreeMap::new();
    for proposal in proposals {
        let slot = slots
            .entry((proposal.target_space.clone(), proposal.key.clone()))
            .or_default();
        slot.retain(|p| p.agent_id != proposal.agent_id);
        slot.push(proposal);
    }

    slots
        .into_values()
        .fold(Resolution::default(), |mut resolution, mut group| {
            let Some(index) = group.iter().position_min_by_key(|p| ranking.rank(p)) else {
                return resolution;
            };
            let winner = group.swap_remove(index);
            group.sort_by_key(|p| ranking.rank(p));

            resolution.conflicts.extend(group.into_iter().map(|loser| ConflictRecord {
                space: winner.target_space.clone(),
                key: winner.key.clone(),
                reason: reason(&winner, &loser, ranking),
                winner: Some(winner.agent_id.clone()),
                competing: vec![winner.clone(), loser],
            }));
            resolution.winners.push(winner);
            resolution
        })
}

fn reason(winner: &Proposal, loser: &Proposal, ranking: &Ranking) -> ConflictReason {
    match (winner.authority, loser.authority) {
        (AuthorityLevel::Primary, AuthorityLevel::Secondary) => ConflictReason::Vetoed {
            by: winner.agent_id.clone(),
        },
        _ if ranking.weight(&winner.agent_id) != ranking.weight(&loser.agent_id) => {
            ConflictReason::OutrankedByWeight
        }
        _ => ConflictReason::RegistrationOrder,
    }
}
