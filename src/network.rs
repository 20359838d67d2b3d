//! The simulation harness: owns a set of agents, derives connectivity from
//! coordinates and residual power, and runs "seasons" of route discovery
//! plus delivery. Grounded on the teacher's `Network`/`Simulation` driver in
//! `src/bin/simulator.rs` — one top-level coordinator object the demo
//! binary builds and drives, with JSON export for external tooling.

use crate::agent::{spawn_agent, AgentHandle, AgentSnapshot, DeliveryOutcome};
use crate::config::{RoutingWeights, SEASON_MAX_ATTEMPT, SEASON_WAIT_TIME};
use crate::coordinate::Coordinate;
use crate::error::HarnessError;
use crate::identity::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;

/// Slim per-node view for the external neighbor-graph plotter — just enough
/// to draw nodes and directed child edges, unlike the full `AgentSnapshot`
/// `stats()` returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologySnapshot {
    pub node_id: NodeId,
    pub coord: Coordinate,
    pub power: f64,
    pub children: Vec<NodeId>,
}

impl From<AgentSnapshot> for TopologySnapshot {
    fn from(s: AgentSnapshot) -> Self {
        Self {
            node_id: s.id,
            coord: s.coord,
            power: s.power,
            children: s.children,
        }
    }
}

/// One point of the `sweep` experiment: the metric weight factor used and
/// what every sender observed trying to reach the destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepPoint {
    pub factor: f64,
    pub outcomes: HashMap<NodeId, DeliveryOutcome>,
}

/// A running mesh of agents plus the coordinates the harness placed them
/// at (coordinates never change after construction, per spec §1 Non-goals
/// on mobility).
pub struct Network {
    nodes: HashMap<NodeId, AgentHandle>,
    coords: HashMap<NodeId, Coordinate>,
}

impl Network {
    /// Spawn one agent per `(addr, coord)` pair. `addr`'s port may be `0`
    /// to let the OS assign one (used by tests); the resulting `NodeId` is
    /// always derived from the address actually bound.
    pub async fn new(placements: Vec<(SocketAddr, Coordinate)>) -> Result<Self, HarnessError> {
        let mut nodes = HashMap::with_capacity(placements.len());
        let mut coords = HashMap::with_capacity(placements.len());
        for (addr, coord) in placements {
            let handle = spawn_agent(coord, addr).await.map_err(crate::error::AgentError::from)?;
            coords.insert(handle.id.clone(), coord);
            nodes.insert(handle.id.clone(), handle);
        }
        Ok(Self { nodes, coords })
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    fn handle(&self, id: &NodeId) -> Result<&AgentHandle, HarnessError> {
        self.nodes.get(id).ok_or_else(|| HarnessError::NodeNotFound(id.clone()))
    }

    /// Recompute link topology from scratch (spec §6 `init_neighbor`):
    ///
    /// 1. Every node drops all of its current child and parent links.
    /// 2. For every ordered pair `(a, b)` with `a != b`, if the Euclidean
    ///    distance between them is within `a`'s current residual power
    ///    *squared* (the area-vs-energy units mismatch is original and
    ///    intentionally preserved, see SPEC_FULL.md Design Notes), `b`
    ///    dials `a` — giving `b` a parent link to `a` and `a` a child link
    ///    to `b`.
    pub async fn init_neighbor(&self) -> Result<(), HarnessError> {
        for handle in self.nodes.values() {
            handle.clear_neighbors().await?;
        }

        let mut residual_power = HashMap::with_capacity(self.nodes.len());
        for (id, handle) in &self.nodes {
            residual_power.insert(id.clone(), handle.snapshot().await?.power);
        }

        let ids: Vec<&NodeId> = self.nodes.keys().collect();
        for &a in &ids {
            for &b in &ids {
                if a == b {
                    continue;
                }
                let distance = self.coords[a].euclidean_distance(&self.coords[b]);
                let power_a = residual_power[a];
                if distance <= power_a * power_a {
                    let addr_a = self.handle(a)?.addr;
                    self.handle(b)?.connect_to(addr_a, a.clone()).await?;
                }
            }
        }
        Ok(())
    }

    /// Rewrite every node's scoring weights to the sweep vector for
    /// `factor` and clear per-node protocol state (seq numbers, power,
    /// routing tables, timers, pending queue, inbox) — spec §6 `reset`.
    /// Link topology is untouched; call `init_neighbor` separately.
    pub async fn reset(&self, factor: f64) -> Result<(), HarnessError> {
        let weights = RoutingWeights::for_sweep_factor(factor);
        for handle in self.nodes.values() {
            handle.reset(weights).await?;
        }
        Ok(())
    }

    /// Run one season: every node other than `dest` sends one USER message
    /// to `dest`. Connectivity is re-derived via `init_neighbor` before each
    /// individual send, matching the original's per-source re-init — power
    /// spent by earlier sends in the same season can shrink a later
    /// sender's reach before it starts its own discovery.
    ///
    /// `send_user_message`'s own `DeliveryOutcome` only reports whether the
    /// sender *found a route* (spec §4.4) — it is not an end-to-end ack. So
    /// after it returns, the harness separately polls `dest`'s inbox for up
    /// to `SEASON_MAX_ATTEMPT * SEASON_WAIT_TIME`, matching the original
    /// `Network.start_season`'s own wait loop over `dest`'s `msg_box`, and
    /// records the outcome the harness itself actually observed.
    pub async fn start_season(
        &self,
        dest: NodeId,
        payload: impl Into<String> + Clone,
    ) -> Result<HashMap<NodeId, DeliveryOutcome>, HarnessError> {
        let mut outcomes = HashMap::new();
        let senders: Vec<NodeId> = self.nodes.keys().filter(|id| **id != dest).cloned().collect();
        for sender in senders {
            self.init_neighbor().await?;
            self.handle(&sender)?.send_user_message(dest.clone(), payload.clone()).await?;

            let mut arrived = self.handle(&dest)?.snapshot().await?.inbox.contains_key(&sender);
            for _ in 0..SEASON_MAX_ATTEMPT {
                if arrived {
                    break;
                }
                tokio::time::sleep(SEASON_WAIT_TIME).await;
                arrived = self.handle(&dest)?.snapshot().await?.inbox.contains_key(&sender);
            }

            let outcome = if arrived { DeliveryOutcome::Delivered } else { DeliveryOutcome::Queued };
            outcomes.insert(sender, outcome);
        }
        Ok(outcomes)
    }

    pub async fn stats(&self, id: &NodeId) -> Result<AgentSnapshot, HarnessError> {
        Ok(self.handle(id)?.snapshot().await?)
    }

    /// A slim snapshot of every node's position and child edges, for the
    /// external neighbor-graph plotter.
    pub async fn topology_snapshot(&self) -> Result<Vec<TopologySnapshot>, HarnessError> {
        let mut out = Vec::with_capacity(self.nodes.len());
        for handle in self.nodes.values() {
            out.push(handle.snapshot().await?.into());
        }
        Ok(out)
    }

    /// Write every node's full `stats()` snapshot to `path` as
    /// pretty-printed JSON.
    pub async fn export_stats_json(&self, path: impl AsRef<Path>) -> Result<(), HarnessError> {
        let mut snapshots = Vec::with_capacity(self.nodes.len());
        for handle in self.nodes.values() {
            snapshots.push(handle.snapshot().await?);
        }
        let json = serde_json::to_string_pretty(&snapshots)?;
        tokio::fs::write(path, json).await.map_err(HarnessError::Io)
    }

    /// Run one season per sweep factor, resetting and re-deriving topology
    /// between runs. The ambient metric-sweep experiment `RoutingWeights`
    /// is built for (spec §6, Non-goals exclude nothing here).
    pub async fn sweep(
        &self,
        dest: NodeId,
        factors: &[f64],
        payload: impl Into<String> + Clone,
    ) -> Result<Vec<SweepPoint>, HarnessError> {
        let mut results = Vec::with_capacity(factors.len());
        for &factor in factors {
            self.reset(factor).await?;
            self.init_neighbor().await?;
            let outcomes = self.start_season(dest.clone(), payload.clone()).await?;
            results.push(SweepPoint { factor, outcomes });
        }
        Ok(results)
    }

    /// Close every node's listening socket and links.
    pub async fn shutdown(self) {
        for (_, handle) in self.nodes {
            handle.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn localhost(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[tokio::test]
    async fn new_spawns_one_agent_per_placement() {
        let network = Network::new(vec![
            (localhost(0), Coordinate::new(0.0, 0.0)),
            (localhost(0), Coordinate::new(1.0, 0.0)),
        ])
        .await
        .unwrap();
        assert_eq!(network.node_ids().count(), 2);
        network.shutdown().await;
    }

    #[tokio::test]
    async fn init_neighbor_connects_reachable_pair() {
        let network = Network::new(vec![
            (localhost(0), Coordinate::new(0.0, 0.0)),
            (localhost(0), Coordinate::new(1.0, 0.0)),
        ])
        .await
        .unwrap();
        network.init_neighbor().await.unwrap();

        let ids: Vec<NodeId> = network.node_ids().cloned().collect();
        let snap_a = network.stats(&ids[0]).await.unwrap();
        let snap_b = network.stats(&ids[1]).await.unwrap();
        // distance 1.0 is well within any reasonable residual power squared
        // (power starts at 5.0), so exactly one of the two ordered checks
        // should have produced a dial.
        assert!(!snap_a.children.is_empty() || !snap_b.children.is_empty());
        network.shutdown().await;
    }
}
