//! The routing agent: one async task per simulated node, owning a mailbox
//! that serializes every mutation of its routing table, power budget,
//! pending queue, inbox, and aggregation timers (spec §5 "Mutation
//! discipline"). Reader tasks (one per live link) and the acceptor task
//! only ever *parse* frames and forward them into the mailbox — all sends
//! happen from the mailbox loop itself, which is what rules out the
//! reentrancy hazard Design Notes §9 flags in the original threaded code.

use crate::config::{RoutingWeights, IDENTITY_HANDSHAKE_LEN, MAX_ATTEMPT, WAIT_TIME};
use crate::coordinate::Coordinate;
use crate::error::{AgentError, LinkError};
use crate::frame::{build_user_frame, ControlFields, Frame, UserFields};
use crate::identity::NodeId;
use crate::power::{Operation, PowerBudget};
use crate::routing_table::{Candidate, ReplaceOutcome, Route, RoutingTable};
use crate::timer::AggregationTimers;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// A single queued USER payload awaiting a route, per spec §3.
#[derive(Debug, Clone)]
struct PendingMessage {
    origin: NodeId,
    payload: String,
}

/// Which side of the link convention (spec §5) an endpoint plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkRole {
    /// We accepted the dial-in; this neighbor receives floods and forwards.
    Child,
    /// We dialed out; this neighbor receives RREPs and reverse traffic.
    Parent,
}

struct LinkEndpoint {
    writer: BufWriter<OwnedWriteHalf>,
    reader_task: JoinHandle<()>,
}

/// Local observation of what happened when `send_user_message` first found
/// (or never found) a route. Purely an ergonomic addition (SPEC_FULL §4.4)
/// over the original's silent polling loop — it does not imply an
/// end-to-end delivery acknowledgment, which the protocol never provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryOutcome {
    /// A route appeared within the attempt budget and the frame was handed
    /// to the link layer (the frame may still have been dropped at a later
    /// hop by a power gate or missing route — this only reports what this
    /// node observed).
    Delivered,
    /// No route appeared within `MAX_ATTEMPT * WAIT_TIME`; queued instead.
    Queued,
}

/// Point-in-time view of an agent's state, for the harness's `stats`/
/// visualization hooks. Serializable for the JSON export path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: NodeId,
    pub coord: Coordinate,
    pub power: f64,
    pub sent_bytes: u64,
    pub received_bytes: u64,
    pub routes: HashMap<NodeId, Route>,
    pub inbox: HashMap<NodeId, String>,
    pub children: Vec<NodeId>,
    pub parents: Vec<NodeId>,
}

enum AgentCommand {
    ConnectTo {
        addr: SocketAddr,
        peer_id: NodeId,
        reply: oneshot::Sender<Result<(), AgentError>>,
    },
    ClearNeighbors {
        reply: oneshot::Sender<()>,
    },
    SendRreq {
        dest: NodeId,
        reply: oneshot::Sender<()>,
    },
    TryDeliverUser {
        dest: NodeId,
        payload: String,
        reply: oneshot::Sender<bool>,
    },
    EnqueuePending {
        dest: NodeId,
        payload: String,
        reply: oneshot::Sender<()>,
    },
    Reset {
        weights: RoutingWeights,
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<AgentSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

enum Mail {
    Command(AgentCommand),
    FrameIn { raw_len: usize, frame: Frame },
    LinkClosed { peer: NodeId, role: LinkRole },
    NewChild { peer: NodeId, writer: BufWriter<OwnedWriteHalf>, reader_task: JoinHandle<()> },
    NewParent { peer: NodeId, writer: BufWriter<OwnedWriteHalf>, reader_task: JoinHandle<()> },
}

struct AgentState {
    id: NodeId,
    coord: Coordinate,
    weights: RoutingWeights,
    seq_no: u64,
    power: PowerBudget,
    sent_bytes: u64,
    received_bytes: u64,
    routing_table: RoutingTable,
    pending: HashMap<NodeId, PendingMessage>,
    inbox: HashMap<NodeId, String>,
    timers: AggregationTimers,
    timer_tx: mpsc::Sender<NodeId>,
    mail_tx: mpsc::Sender<Mail>,
    childs: HashMap<NodeId, LinkEndpoint>,
    parents: HashMap<NodeId, LinkEndpoint>,
}

impl AgentState {
    fn new(
        id: NodeId,
        coord: Coordinate,
        timer_tx: mpsc::Sender<NodeId>,
        mail_tx: mpsc::Sender<Mail>,
    ) -> Self {
        Self {
            id,
            coord,
            weights: RoutingWeights::default(),
            seq_no: 0,
            power: PowerBudget::new(),
            sent_bytes: 0,
            received_bytes: 0,
            routing_table: RoutingTable::new(),
            pending: HashMap::new(),
            inbox: HashMap::new(),
            timers: AggregationTimers::new(),
            timer_tx,
            mail_tx,
            childs: HashMap::new(),
            parents: HashMap::new(),
        }
    }

    fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot {
            id: self.id.clone(),
            coord: self.coord,
            power: self.power.residual(),
            sent_bytes: self.sent_bytes,
            received_bytes: self.received_bytes,
            routes: self
                .routing_table
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            inbox: self.inbox.clone(),
            children: self.childs.keys().cloned().collect(),
            parents: self.parents.keys().cloned().collect(),
        }
    }
}

/// A handle other tasks use to drive one agent. Cheap to hold, not to
/// clone (owns the acceptor/mailbox task handles so shutdown can reach
/// them); the harness keeps one per node.
pub struct AgentHandle {
    pub id: NodeId,
    pub addr: SocketAddr,
    tx: mpsc::Sender<Mail>,
    acceptor_task: JoinHandle<()>,
    mailbox_task: JoinHandle<()>,
}

impl AgentHandle {
    /// Dial `addr` (identified as `peer_id`); on success this node gets a
    /// *parent* link to `peer_id` (spec §5 link directionality).
    pub async fn connect_to(&self, addr: SocketAddr, peer_id: NodeId) -> Result<(), AgentError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Mail::Command(AgentCommand::ConnectTo { addr, peer_id, reply }))
            .await
            .map_err(|_| AgentError::MailboxClosed)?;
        rx.await.map_err(|_| AgentError::MailboxClosed)?
    }

    /// Close and forget every child/parent link (the first step of the
    /// harness's `init_neighbor`).
    pub async fn clear_neighbors(&self) -> Result<(), AgentError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Mail::Command(AgentCommand::ClearNeighbors { reply }))
            .await
            .map_err(|_| AgentError::MailboxClosed)?;
        rx.await.map_err(|_| AgentError::MailboxClosed)
    }

    /// `send_user_message` (spec §4.4): emit an RREQ, poll up to
    /// `MAX_ATTEMPT` times at `WAIT_TIME` intervals, then fall back to the
    /// pending queue. The busy-wait lives here, in the caller's task, so the
    /// agent's mailbox keeps servicing RREQ/RREP arrivals while this runs.
    pub async fn send_user_message(
        &self,
        dest: NodeId,
        payload: impl Into<String>,
    ) -> Result<DeliveryOutcome, AgentError> {
        let payload = payload.into();

        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Mail::Command(AgentCommand::SendRreq { dest: dest.clone(), reply }))
            .await
            .map_err(|_| AgentError::MailboxClosed)?;
        rx.await.map_err(|_| AgentError::MailboxClosed)?;

        for _ in 0..MAX_ATTEMPT {
            tokio::time::sleep(WAIT_TIME).await;
            let (reply, rx) = oneshot::channel();
            self.tx
                .send(Mail::Command(AgentCommand::TryDeliverUser {
                    dest: dest.clone(),
                    payload: payload.clone(),
                    reply,
                }))
                .await
                .map_err(|_| AgentError::MailboxClosed)?;
            if rx.await.map_err(|_| AgentError::MailboxClosed)? {
                return Ok(DeliveryOutcome::Delivered);
            }
        }

        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Mail::Command(AgentCommand::EnqueuePending { dest, payload, reply }))
            .await
            .map_err(|_| AgentError::MailboxClosed)?;
        rx.await.map_err(|_| AgentError::MailboxClosed)?;
        Ok(DeliveryOutcome::Queued)
    }

    pub async fn reset(&self, weights: RoutingWeights) -> Result<(), AgentError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Mail::Command(AgentCommand::Reset { weights, reply }))
            .await
            .map_err(|_| AgentError::MailboxClosed)?;
        rx.await.map_err(|_| AgentError::MailboxClosed)
    }

    pub async fn snapshot(&self) -> Result<AgentSnapshot, AgentError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Mail::Command(AgentCommand::Snapshot { reply }))
            .await
            .map_err(|_| AgentError::MailboxClosed)?;
        rx.await.map_err(|_| AgentError::MailboxClosed)
    }

    /// Close the listening socket and every parent-side socket (spec §6
    /// `shutdown`), then tear down this node's background tasks.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self
            .tx
            .send(Mail::Command(AgentCommand::Shutdown { reply }))
            .await
            .is_ok()
        {
            let _ = rx.await;
        }
        self.acceptor_task.abort();
        self.mailbox_task.abort();
    }
}

/// Bind `addr` and start this node's acceptor and mailbox tasks. The node's
/// identity is always the actually-bound address (not the requested one),
/// so binding to port 0 in tests yields a correct, usable identity.
pub async fn spawn_agent(coord: Coordinate, addr: SocketAddr) -> Result<AgentHandle, LinkError> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    let id = NodeId::new(local_addr.to_string());

    let (mail_tx, mail_rx) = mpsc::channel(256);
    let (timer_tx, timer_rx) = mpsc::channel(64);

    let acceptor_task = {
        let mail_tx = mail_tx.clone();
        tokio::spawn(run_acceptor(listener, mail_tx))
    };

    let mailbox_task = {
        let id = id.clone();
        let mail_tx_for_state = mail_tx.clone();
        tokio::spawn(run_mailbox(id, coord, timer_tx, mail_tx_for_state, mail_rx, timer_rx))
    };

    Ok(AgentHandle {
        id,
        addr: local_addr,
        tx: mail_tx,
        acceptor_task,
        mailbox_task,
    })
}

async fn run_acceptor(listener: TcpListener, mail_tx: mpsc::Sender<Mail>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                let mail_tx = mail_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = accept_one(stream, mail_tx).await {
                        tracing::debug!(%peer_addr, %err, "acceptor failed identity handshake");
                    }
                });
            }
            Err(err) => {
                tracing::warn!(%err, "acceptor loop terminating");
                break;
            }
        }
    }
}

/// Read the dialing peer's identity handshake (up to 21 bytes sent as the
/// very first bytes of the stream, spec §6), then register it as a child.
async fn accept_one(mut stream: TcpStream, mail_tx: mpsc::Sender<Mail>) -> Result<(), LinkError> {
    let mut buf = vec![0u8; IDENTITY_HANDSHAKE_LEN];
    let n = stream.read(&mut buf).await?;
    if n == 0 {
        return Err(LinkError::Closed);
    }
    let peer_id = NodeId::new(String::from_utf8_lossy(&buf[..n]).to_string());

    let (read_half, write_half) = stream.into_split();
    let writer = BufWriter::new(write_half);
    let reader_task = spawn_reader(read_half, peer_id.clone(), mail_tx.clone(), LinkRole::Child);

    mail_tx
        .send(Mail::NewChild {
            peer: peer_id,
            writer,
            reader_task,
        })
        .await
        .map_err(|_| LinkError::Closed)
}

/// One reader task per live link: parse newline-framed records and forward
/// them to the mailbox. Never writes, never mutates agent state directly —
/// only the mailbox loop does that (spec §5 "Mutation discipline").
fn spawn_reader(
    read_half: OwnedReadHalf,
    peer: NodeId,
    mail_tx: mpsc::Sender<Mail>,
    role: LinkRole,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    let _ = mail_tx.send(Mail::LinkClosed { peer: peer.clone(), role }).await;
                    break;
                }
                Ok(_) => {
                    let raw_len = line.len();
                    let trimmed = line.trim_end_matches(['\r', '\n']);
                    if trimmed.is_empty() {
                        continue;
                    }
                    match Frame::parse(trimmed) {
                        Ok(frame) => {
                            if mail_tx.send(Mail::FrameIn { raw_len, frame }).await.is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            tracing::debug!(%peer, %err, "dropping malformed frame");
                        }
                    }
                }
                Err(err) => {
                    tracing::debug!(%peer, %err, "reader terminating on read error");
                    let _ = mail_tx.send(Mail::LinkClosed { peer: peer.clone(), role }).await;
                    break;
                }
            }
        }
    })
}

async fn run_mailbox(
    id: NodeId,
    coord: Coordinate,
    timer_tx: mpsc::Sender<NodeId>,
    mail_tx: mpsc::Sender<Mail>,
    mut mail_rx: mpsc::Receiver<Mail>,
    mut timer_rx: mpsc::Receiver<NodeId>,
) {
    let mut state = AgentState::new(id, coord, timer_tx, mail_tx);
    loop {
        tokio::select! {
            mail = mail_rx.recv() => {
                match mail {
                    Some(m) => handle_mail(&mut state, m).await,
                    None => break,
                }
            }
            fired = timer_rx.recv() => {
                match fired {
                    Some(origin) => {
                        state.timers.clear(&origin);
                        send_rrep(&mut state, origin).await;
                    }
                    None => {}
                }
            }
        }
    }
}

async fn handle_mail(state: &mut AgentState, mail: Mail) {
    match mail {
        Mail::Command(cmd) => handle_command(state, cmd).await,
        Mail::FrameIn { raw_len, frame } => handle_frame(state, raw_len, frame).await,
        Mail::LinkClosed { peer, role } => match role {
            LinkRole::Child => {
                state.childs.remove(&peer);
            }
            LinkRole::Parent => {
                state.parents.remove(&peer);
            }
        },
        Mail::NewChild { peer, writer, reader_task } => {
            insert_endpoint(&mut state.childs, peer, writer, reader_task);
        }
        Mail::NewParent { peer, writer, reader_task } => {
            insert_endpoint(&mut state.parents, peer, writer, reader_task);
        }
    }
}

fn insert_endpoint(
    map: &mut HashMap<NodeId, LinkEndpoint>,
    peer: NodeId,
    writer: BufWriter<OwnedWriteHalf>,
    reader_task: JoinHandle<()>,
) {
    if let Some(previous) = map.insert(peer, LinkEndpoint { writer, reader_task }) {
        previous.reader_task.abort();
    }
}

async fn handle_command(state: &mut AgentState, cmd: AgentCommand) {
    match cmd {
        AgentCommand::ConnectTo { addr, peer_id, reply } => {
            let result = connect_to(state, addr, peer_id).await;
            let _ = reply.send(result);
        }
        AgentCommand::ClearNeighbors { reply } => {
            clear_links(&mut state.childs);
            clear_links(&mut state.parents);
            let _ = reply.send(());
        }
        AgentCommand::SendRreq { dest, reply } => {
            send_rreq(state, dest).await;
            let _ = reply.send(());
        }
        AgentCommand::TryDeliverUser { dest, payload, reply } => {
            let delivered = try_deliver_user(state, dest, payload).await;
            let _ = reply.send(delivered);
        }
        AgentCommand::EnqueuePending { dest, payload, reply } => {
            // Capacity 1 per destination, last write wins (spec §3/§9 — never
            // promoted to a FIFO).
            state.pending.insert(dest.clone(), PendingMessage { origin: state.id.clone(), payload });
            let _ = reply.send(());
        }
        AgentCommand::Reset { weights, reply } => {
            state.weights = weights;
            state.seq_no = 0;
            state.power.reset();
            state.sent_bytes = 0;
            state.received_bytes = 0;
            state.routing_table.clear();
            state.timers.cancel_all();
            state.inbox.clear();
            state.pending.clear();
            let _ = reply.send(());
        }
        AgentCommand::Snapshot { reply } => {
            let _ = reply.send(state.snapshot());
        }
        AgentCommand::Shutdown { reply } => {
            // Only parent-side links close here, matching the original
            // `Network.shutdown()` (closes `node.sock` and `node.parents`,
            // never `node.childs`) — peers that dialed into this node are
            // not forced to observe a spurious close.
            clear_links(&mut state.parents);
            state.timers.cancel_all();
            let _ = reply.send(());
        }
    }
}

fn clear_links(map: &mut HashMap<NodeId, LinkEndpoint>) {
    for (_, endpoint) in map.drain() {
        endpoint.reader_task.abort();
        // `writer` drops here, closing that half of the socket.
    }
}

async fn connect_to(state: &mut AgentState, addr: SocketAddr, peer_id: NodeId) -> Result<(), AgentError> {
    let mut stream = TcpStream::connect(addr).await.map_err(LinkError::Io)?;
    stream
        .write_all(state.id.as_str().as_bytes())
        .await
        .map_err(LinkError::Io)?;
    let (read_half, write_half) = stream.into_split();
    let writer = BufWriter::new(write_half);
    let reader_task = spawn_reader(read_half, peer_id.clone(), state.mail_tx.clone(), LinkRole::Parent);
    insert_endpoint(&mut state.parents, peer_id, writer, reader_task);
    Ok(())
}

async fn send_rreq(state: &mut AgentState, dest: NodeId) {
    state.seq_no += 1;
    let control = ControlFields {
        seq: state.seq_no,
        origin: state.id.clone(),
        sender: state.id.clone(),
        dest,
        coord: state.coord,
        hop: 0,
        dist: 0.0,
        power: f64::INFINITY,
    };
    broadcast_rreq(state, &Frame::Rreq(control)).await;
}

/// Fires when this node is the destination of the RREQ wave for `dest`
/// (named to match the original's `send_rrep(dest)`, where `dest` is the
/// RREQ's `origin`, i.e. the node this RREP is addressed back to).
async fn send_rrep(state: &mut AgentState, dest: NodeId) {
    let Some(route) = state.routing_table.get(&dest).cloned() else {
        return;
    };
    state.seq_no += 1;
    let control = ControlFields {
        seq: state.seq_no,
        origin: state.id.clone(),
        sender: state.id.clone(),
        dest,
        coord: state.coord,
        hop: 0,
        dist: 0.0,
        power: f64::INFINITY,
    };
    unicast_rrep(state, &route.next_hop, &Frame::Rrep(control)).await;
}

async fn handle_frame(state: &mut AgentState, raw_len: usize, frame: Frame) {
    match frame {
        Frame::Rreq(control) => process_rreq(state, control).await,
        Frame::Rrep(control) => process_rrep(state, control).await,
        Frame::User(fields) => process_user(state, raw_len, fields).await,
    }
}

async fn process_rreq(state: &mut AgentState, c: ControlFields) {
    let origin = c.origin.clone();
    if origin == state.id {
        return;
    }

    let hop = c.hop + 1;
    let dist = c.dist + c.coord.euclidean_distance(&state.coord);
    let power = c.power.min(state.power.residual());
    let score = state.weights.score(dist, hop, power);
    let candidate = Candidate {
        next_hop: c.sender.clone(),
        seq_no: c.seq,
        hop,
        distance: dist,
        power,
        score,
    };
    let outcome = state.routing_table.apply_rreq_candidate(origin.clone(), candidate);

    if state.id == c.dest {
        // Destination: every RREQ for this origin, improving or not, (re)arms
        // the aggregation timer (spec §4.2 "best-of-wave" behavior).
        state.timers.rearm(origin, state.timer_tx.clone());
    } else if outcome == ReplaceOutcome::Installed {
        let rebroadcast = ControlFields {
            seq: c.seq,
            origin,
            sender: state.id.clone(),
            dest: c.dest,
            coord: state.coord,
            hop,
            dist,
            power,
        };
        broadcast_rreq(state, &Frame::Rreq(rebroadcast)).await;
    }
    // Rejected and not the destination: absorbed silently.
}

async fn process_rrep(state: &mut AgentState, c: ControlFields) {
    let wave_origin = c.origin.clone(); // the RREQ destination that emitted this RREP
    let hop = c.hop + 1;
    let dist = c.dist + c.coord.euclidean_distance(&state.coord);
    let power = c.power.min(state.power.residual());
    let score = state.weights.score(dist, hop, power);
    let candidate = Candidate {
        next_hop: c.sender.clone(),
        seq_no: c.seq,
        hop,
        distance: dist,
        power,
        score,
    };
    // Unconditional install — RREP replacement never checks freshness/score
    // (spec §4.3, preserved exactly; see Design Notes in SPEC_FULL.md).
    state.routing_table.install_rrep_candidate(wave_origin.clone(), candidate);

    let final_recipient = state.id == c.dest;
    if !final_recipient {
        if let Some(route) = state.routing_table.get(&c.dest).cloned() {
            let forward = ControlFields {
                seq: c.seq,
                origin: wave_origin,
                sender: state.id.clone(),
                dest: c.dest,
                coord: state.coord,
                hop,
                dist,
                power,
            };
            unicast_rrep(state, &route.next_hop, &Frame::Rrep(forward)).await;
        } else {
            tracing::debug!(node = %state.id, dest = %c.dest, "no route to forward RREP, dropping");
        }
    }
}

async fn process_user(state: &mut AgentState, raw_len: usize, u: UserFields) {
    if !state.power.can_afford(Operation::Receive, raw_len) {
        tracing::warn!(node = %state.id, origin = %u.origin, "low power, dropping received USER frame");
        return;
    }
    state.power.debit(Operation::Receive, raw_len);
    state.received_bytes += raw_len as u64;

    if state.id == u.dest {
        state.inbox.insert(u.origin, u.payload);
        return;
    }

    let Some(route) = state.routing_table.get(&u.dest).cloned() else {
        tracing::debug!(node = %state.id, dest = %u.dest, "no route, dropping USER frame");
        return;
    };
    let frame = Frame::User(UserFields {
        origin: u.origin,
        dest: u.dest,
        payload: u.payload,
    });
    forward_user(state, &route.next_hop, &frame).await;
}

/// Try to deliver a USER payload now; returns whether a route existed.
/// On success also flushes any other pending destinations that now have a
/// route — resolving the original's ambiguous no-argument call to
/// `send_pending_msgs(dest)` as "retry the whole pending map" (SPEC_FULL
/// §9, Open Question (i)).
async fn try_deliver_user(state: &mut AgentState, dest: NodeId, payload: String) -> bool {
    let Some(route) = state.routing_table.get(&dest).cloned() else {
        return false;
    };
    match build_user_frame(state.id.clone(), dest.clone(), payload) {
        Ok(frame) => forward_user(state, &route.next_hop, &frame).await,
        Err(err) => tracing::warn!(node = %state.id, %err, "dropping invalid USER payload"),
    }
    flush_pending(state).await;
    true
}

async fn flush_pending(state: &mut AgentState) {
    let dests: Vec<NodeId> = state.pending.keys().cloned().collect();
    for dest in dests {
        let Some(route) = state.routing_table.get(&dest).cloned() else {
            continue;
        };
        let Some(msg) = state.pending.remove(&dest) else {
            continue;
        };
        if let Ok(frame) = build_user_frame(msg.origin, dest.clone(), msg.payload) {
            forward_user(state, &route.next_hop, &frame).await;
        }
    }
}

/// RREQ flood: unconditional, unhopped send on every child link.
async fn broadcast_rreq(state: &mut AgentState, frame: &Frame) {
    let encoded = frame.encode();
    for (peer, endpoint) in state.childs.iter_mut() {
        if let Err(err) = write_line(endpoint, &encoded).await {
            tracing::debug!(node = %state.id, %peer, %err, "failed to send RREQ");
        }
    }
}

/// RREP unicast, along the reverse path (the single parent link named by
/// `next_hop`). Never power-gated (control traffic, spec §3).
async fn unicast_rrep(state: &mut AgentState, next_hop: &NodeId, frame: &Frame) {
    let encoded = frame.encode();
    match state.parents.get_mut(next_hop) {
        Some(endpoint) => {
            if let Err(err) = write_line(endpoint, &encoded).await {
                tracing::debug!(node = %state.id, %next_hop, %err, "failed to send RREP");
            }
        }
        None => tracing::debug!(node = %state.id, %next_hop, "no parent link, dropping RREP"),
    }
}

/// USER frame send/forward: power-gated, along the child link named by
/// `next_hop` (spec §4.4, §5 — USER frames flow along child links in the
/// direction of the established route).
async fn forward_user(state: &mut AgentState, next_hop: &NodeId, frame: &Frame) {
    let encoded = frame.encode();
    let len = encoded.len();
    if !state.power.can_afford(Operation::Send, len) {
        tracing::warn!(node = %state.id, %next_hop, "low power, dropping USER frame");
        return;
    }
    match state.childs.get_mut(next_hop) {
        Some(endpoint) => match write_line(endpoint, &encoded).await {
            Ok(()) => {
                state.power.debit(Operation::Send, len);
                state.sent_bytes += len as u64;
            }
            Err(err) => tracing::debug!(node = %state.id, %next_hop, %err, "failed to send USER frame"),
        },
        None => tracing::debug!(node = %state.id, %next_hop, "next hop not connected, dropping USER frame"),
    }
}

async fn write_line(endpoint: &mut LinkEndpoint, encoded: &str) -> std::io::Result<()> {
    endpoint.writer.write_all(encoded.as_bytes()).await?;
    endpoint.writer.flush().await
}
