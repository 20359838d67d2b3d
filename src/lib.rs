//! Energy-aware, metric-weighted AODV-style routing over a TCP mesh.
//!
//! `agent` is the per-node routing actor (mailbox, link I/O, protocol
//! handlers); `network` is the harness that places nodes, derives
//! connectivity, and drives discovery seasons. Everything below that is
//! shared vocabulary: `frame` (wire format), `routing_table` (replacement
//! rule), `power` (transport budget), `timer` (aggregation window),
//! `identity`/`coordinate`/`config` (primitive types and tunables), and
//! `error` (the error types each layer returns).

pub mod agent;
pub mod config;
pub mod coordinate;
pub mod error;
pub mod frame;
pub mod identity;
pub mod network;
pub mod power;
pub mod routing_table;
pub mod timer;
