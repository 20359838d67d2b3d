//! Routing table and the route-replacement rule.
//!
//! One record per destination (spec invariant (i)); replacement is either
//! the freshness/score rule (RREQ) or unconditional (RREP — spec §4.3,
//! preserved exactly as a documented divergence from the RREQ rule).

use crate::identity::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single routing-table entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub next_hop: NodeId,
    pub seq_no: u64,
    pub hop: u32,
    pub distance: f64,
    pub power: f64,
    pub score: f64,
}

/// A candidate route derived from an incoming RREQ/RREP, prior to the
/// replacement decision.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub next_hop: NodeId,
    pub seq_no: u64,
    pub hop: u32,
    pub distance: f64,
    pub power: f64,
    pub score: f64,
}

impl From<Candidate> for Route {
    fn from(c: Candidate) -> Self {
        Route {
            next_hop: c.next_hop,
            seq_no: c.seq_no,
            hop: c.hop,
            distance: c.distance,
            power: c.power,
            score: c.score,
        }
    }
}

/// Outcome of applying the replacement rule, for callers that need to know
/// whether a rebroadcast / timer rearm should follow (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Installed,
    Rejected,
}

#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    routes: HashMap<NodeId, Route>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, dest: &NodeId) -> Option<&Route> {
        self.routes.get(dest)
    }

    pub fn contains(&self, dest: &NodeId) -> bool {
        self.routes.contains_key(dest)
    }

    pub fn clear(&mut self) {
        self.routes.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &Route)> {
        self.routes.iter()
    }

    /// Apply the RREQ replacement rule (spec §4.1) for destination `key`.
    ///
    /// 1. No route yet -> install.
    /// 2. `seq_no` strictly greater than stored -> install (freshness wins).
    /// 3. `seq_no` equal and `score` strictly greater -> install.
    /// 4. Otherwise -> reject.
    pub fn apply_rreq_candidate(&mut self, key: NodeId, candidate: Candidate) -> ReplaceOutcome {
        let install = match self.routes.get(&key) {
            None => true,
            Some(existing) => {
                candidate.seq_no > existing.seq_no
                    || (candidate.seq_no == existing.seq_no && candidate.score > existing.score)
            }
        };
        if install {
            self.routes.insert(key, candidate.into());
            ReplaceOutcome::Installed
        } else {
            ReplaceOutcome::Rejected
        }
    }

    /// RREP installs unconditionally (spec §4.3) — no freshness/score check.
    /// This is intentionally asymmetric with `apply_rreq_candidate`: it is
    /// the authoritative reverse-path installer and is load-bearing exactly
    /// because it never rejects.
    pub fn install_rrep_candidate(&mut self, key: NodeId, candidate: Candidate) {
        self.routes.insert(key, candidate.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(next_hop: &str, seq_no: u64, hop: u32, distance: f64, power: f64, score: f64) -> Candidate {
        Candidate {
            next_hop: NodeId::new(next_hop),
            seq_no,
            hop,
            distance,
            power,
            score,
        }
    }

    #[test]
    fn first_route_always_installs() {
        let mut table = RoutingTable::new();
        let outcome =
            table.apply_rreq_candidate(NodeId::new("D"), candidate("N1", 1, 1, 10.0, 5.0, -11.0));
        assert_eq!(outcome, ReplaceOutcome::Installed);
        assert!(table.contains(&NodeId::new("D")));
    }

    #[test]
    fn strictly_fresher_seq_wins_even_with_worse_score() {
        let mut table = RoutingTable::new();
        table.apply_rreq_candidate(NodeId::new("D"), candidate("N1", 1, 1, 10.0, 5.0, 100.0));
        let outcome =
            table.apply_rreq_candidate(NodeId::new("D"), candidate("N2", 2, 5, 50.0, 5.0, -50.0));
        assert_eq!(outcome, ReplaceOutcome::Installed);
        assert_eq!(table.get(&NodeId::new("D")).unwrap().seq_no, 2);
        assert_eq!(table.get(&NodeId::new("D")).unwrap().next_hop, NodeId::new("N2"));
    }

    #[test]
    fn same_seq_better_score_wins() {
        let mut table = RoutingTable::new();
        table.apply_rreq_candidate(NodeId::new("D"), candidate("N1", 1, 3, 30.0, 5.0, -31.0));
        let outcome =
            table.apply_rreq_candidate(NodeId::new("D"), candidate("N2", 1, 2, 20.0, 5.0, -21.5));
        assert_eq!(outcome, ReplaceOutcome::Installed);
        assert_eq!(table.get(&NodeId::new("D")).unwrap().next_hop, NodeId::new("N2"));
    }

    #[test]
    fn same_seq_equal_or_worse_score_rejects() {
        let mut table = RoutingTable::new();
        table.apply_rreq_candidate(NodeId::new("D"), candidate("N1", 1, 2, 20.0, 5.0, -21.5));
        let outcome =
            table.apply_rreq_candidate(NodeId::new("D"), candidate("N2", 1, 3, 30.0, 5.0, -31.0));
        assert_eq!(outcome, ReplaceOutcome::Rejected);
        assert_eq!(table.get(&NodeId::new("D")).unwrap().next_hop, NodeId::new("N1"));
    }

    #[test]
    fn rrep_installs_unconditionally() {
        let mut table = RoutingTable::new();
        table.apply_rreq_candidate(NodeId::new("D"), candidate("N1", 5, 1, 5.0, 5.0, 100.0));
        table.install_rrep_candidate(NodeId::new("D"), candidate("N2", 1, 99, 999.0, 0.0, -9999.0));
        assert_eq!(table.get(&NodeId::new("D")).unwrap().next_hop, NodeId::new("N2"));
    }
}
