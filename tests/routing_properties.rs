//! Property tests for the scoring function, the RREQ replacement rule, and
//! the power gate, in the teacher's `proptest` convention.

use aodv_mesh::config::{RoutingWeights, SEND_LOSS_RATE, SEND_THRESHOLD};
use aodv_mesh::identity::NodeId;
use aodv_mesh::power::{Operation, PowerBudget};
use aodv_mesh::routing_table::{Candidate, ReplaceOutcome, RoutingTable};
use proptest::prelude::*;

fn candidate(next_hop: &str, seq_no: u64, hop: u32, distance: f64, score: f64) -> Candidate {
    Candidate {
        next_hop: NodeId::new(next_hop),
        seq_no,
        hop,
        distance,
        power: 0.0,
        score,
    }
}

proptest! {
    /// Invariant 1: one extra hop always costs exactly `weights.hop`, so
    /// with the default negative hop weight, score strictly decreases.
    #[test]
    fn score_strictly_decreases_with_extra_hop(
        distance in 0.0f64..1000.0,
        hop in 0u32..1000,
        power in 0.0f64..100.0,
    ) {
        let weights = RoutingWeights::default_weights();
        let base = weights.score(distance, hop, power);
        let next = weights.score(distance, hop + 1, power);
        prop_assert!(next < base);
    }

    /// Invariant 2 ("fresh beats better"): a strictly fresher seq_no always
    /// installs, no matter how much worse its score is.
    #[test]
    fn strictly_fresher_seq_always_installs(
        seq1 in 0u64..10_000,
        bump in 1u64..10_000,
        score1 in -10_000.0f64..10_000.0,
        score2 in -10_000.0f64..10_000.0,
        hop1 in 0u32..500,
        hop2 in 0u32..500,
    ) {
        let mut table = RoutingTable::new();
        let dest = NodeId::new("dest");
        table.apply_rreq_candidate(dest.clone(), candidate("n1", seq1, hop1, 0.0, score1));

        let outcome = table.apply_rreq_candidate(
            dest.clone(),
            candidate("n2", seq1 + bump, hop2, 0.0, score2),
        );

        prop_assert_eq!(outcome, ReplaceOutcome::Installed);
        prop_assert_eq!(table.get(&dest).unwrap().next_hop, NodeId::new("n2"));
    }

    /// Same seq_no never regresses to a worse-or-equal score.
    #[test]
    fn same_seq_never_installs_worse_or_equal_score(
        seq in 0u64..10_000,
        score1 in -10_000.0f64..10_000.0,
        delta in 0.0f64..10_000.0,
    ) {
        let mut table = RoutingTable::new();
        let dest = NodeId::new("dest");
        table.apply_rreq_candidate(dest.clone(), candidate("n1", seq, 1, 0.0, score1));

        let outcome = table.apply_rreq_candidate(
            dest.clone(),
            candidate("n2", seq, 1, 0.0, score1 - delta),
        );

        prop_assert_eq!(outcome, ReplaceOutcome::Rejected);
        prop_assert_eq!(table.get(&dest).unwrap().next_hop, NodeId::new("n1"));
    }

    /// Invariant 5: residual power is monotone non-increasing under any
    /// sequence of gated debits.
    #[test]
    fn debit_sequence_never_increases_residual(
        ops in proptest::collection::vec((any::<bool>(), 1usize..2000), 0..50),
    ) {
        let mut budget = PowerBudget::new();
        let mut prev = budget.residual();
        for (is_send, len) in ops {
            let op = if is_send { Operation::Send } else { Operation::Receive };
            if budget.can_afford(op, len) {
                budget.debit(op, len);
            }
            let now = budget.residual();
            prop_assert!(now <= prev + 1e-9);
            prev = now;
        }
    }

    /// Invariant 6: the gate always agrees with the threshold formula,
    /// regardless of how residual power got to its current value.
    #[test]
    fn gate_matches_threshold_formula_after_arbitrary_debits(
        ops in proptest::collection::vec((any::<bool>(), 1usize..2000), 0..50),
        probe_len in 1usize..2000,
    ) {
        let mut budget = PowerBudget::new();
        for (is_send, len) in ops {
            let op = if is_send { Operation::Send } else { Operation::Receive };
            if budget.can_afford(op, len) {
                budget.debit(op, len);
            }
        }
        let allowed = budget.can_afford(Operation::Send, probe_len);
        let manual = (probe_len as f64) * SEND_LOSS_RATE <= budget.residual() - SEND_THRESHOLD;
        prop_assert_eq!(allowed, manual);
    }
}
