//! Manages a small pool of peers against a network's DNS seeds, elects a
//! single syncing peer, multicasts outbound transactions, and restarts
//! failed peers.
//!
//! The peer map and syncer-election state live entirely inside one
//! actor task fed by an `mpsc` channel — the "single serialized queue"
//! §5 mandates to eliminate peer-map races, rather than a `RwLock`
//! sprinkled through the struct.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::chain::{BlockChain, SyncController, SyncControllerEvent, SyncState};
use crate::config::ClientConfig;
use crate::network::peer::{self, PeerCommand, PeerEvent, PeerHandle};
use crate::network::protocol::{Message, TxMessage};

/// Coarse progress/lifecycle notifications a host application consumes.
#[derive(Debug, Clone)]
pub enum PeerGroupEvent {
    Started,
    Stopped,
    TransactionReceived(TxMessage),
    SyncStateChanged(SyncState),
}

/// Sync-method delegate a caller implements to react to `PeerGroup`
/// lifecycle events from inside the actor loop. All methods have no-op
/// defaults so a caller only overrides what it needs.
pub trait PeerGroupDelegate: Send + Sync {
    fn peer_group_started(&self) {}
    fn peer_group_stopped(&self) {}
    fn transaction_received(&self, _tx: &TxMessage) {}
    fn sync_state_changed(&self, _state: SyncState) {}
}

/// A delegate that forwards every notification onto an unbounded
/// channel, for callers who would rather `.await` a stream of events
/// than implement [`PeerGroupDelegate`] directly.
pub struct ChannelDelegate {
    tx: mpsc::UnboundedSender<PeerGroupEvent>,
}

impl ChannelDelegate {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PeerGroupEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl PeerGroupDelegate for ChannelDelegate {
    fn peer_group_started(&self) {
        let _ = self.tx.send(PeerGroupEvent::Started);
    }
    fn peer_group_stopped(&self) {
        let _ = self.tx.send(PeerGroupEvent::Stopped);
    }
    fn transaction_received(&self, tx: &TxMessage) {
        let _ = self.tx.send(PeerGroupEvent::TransactionReceived(tx.clone()));
    }
    fn sync_state_changed(&self, state: SyncState) {
        let _ = self.tx.send(PeerGroupEvent::SyncStateChanged(state));
    }
}

enum Command {
    Start,
    Stop,
    AddFilter(Vec<u8>),
    SendTransaction(TxMessage),
    PeerEvent { addr: SocketAddr, event: PeerEvent },
    PeerConnected { addr: SocketAddr, handle: PeerHandle },
    ConnectFailed { addr: SocketAddr },
}

struct PeerEntry {
    handle: PeerHandle,
    ready: bool,
}

struct Actor {
    chain: BlockChain,
    config: ClientConfig,
    max_connections: usize,
    only_checkpoints: bool,
    delegate: Arc<dyn PeerGroupDelegate>,
    command_tx: mpsc::UnboundedSender<Command>,
    peers: HashMap<SocketAddr, PeerEntry>,
    syncer: Option<SocketAddr>,
    controller: Option<SyncController>,
    filter_elements: Vec<Vec<u8>>,
    pending_outbound: Vec<TxMessage>,
    seed_cursor: usize,
    running: bool,
}

impl Actor {
    fn resolve_targets(&mut self, count: usize) -> Vec<String> {
        let seeds = self.chain_network().dns_seeds;
        if seeds.is_empty() {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(seeds[self.seed_cursor % seeds.len()].to_string());
            self.seed_cursor += 1;
        }
        out
    }

    fn chain_network(&self) -> crate::config::Network {
        self.config.network.clone()
    }

    async fn fill_connections(&mut self) {
        let deficit = self.max_connections.saturating_sub(self.peers.len());
        if deficit == 0 {
            return;
        }
        let port = self.chain_network().default_port;
        for seed in self.resolve_targets(deficit) {
            let command_tx = self.command_tx.clone();
            let network = self.chain_network();
            let config = self.config.clone();
            let host = format!("{seed}:{port}");
            tokio::spawn(async move {
                let resolved = match tokio::net::lookup_host(&host).await {
                    Ok(mut addrs) => addrs.next(),
                    Err(e) => {
                        warn!(seed = %host, error = %e, "dns seed lookup failed");
                        None
                    }
                };
                let Some(addr) = resolved else { return };
                match peer::connect(addr, network, config).await {
                    Ok((handle, mut events)) => {
                        let _ = command_tx.send(Command::PeerConnected { addr, handle });
                        while let Some(event) = events.recv().await {
                            if command_tx
                                .send(Command::PeerEvent { addr, event })
                                .is_err()
                            {
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(%addr, error = %e, "peer connect failed");
                        let _ = command_tx.send(Command::ConnectFailed { addr });
                    }
                }
            });
        }
    }

    fn promote_syncer(&mut self, addr: SocketAddr) {
        if self.syncer.is_some() {
            return;
        }
        let Some(entry) = self.peers.get(&addr) else { return };
        let latest_hash = self
            .chain
            .latest_hash()
            .ok()
            .flatten()
            .unwrap_or(self.chain_network().genesis_hash);
        let controller = match SyncController::new(
            self.chain.store().clone(),
            self.chain_network(),
            self.only_checkpoints,
        ) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "failed to start sync controller");
                return;
            }
        };
        info!(%addr, "promoted to syncing peer");
        entry
            .handle
            .start_sync(self.filter_elements.clone(), latest_hash, self.only_checkpoints);
        self.syncer = Some(addr);
        self.controller = Some(controller);
        self.delegate
            .sync_state_changed(SyncState::Syncing { progress: 0.0 });
    }

    fn demote_syncer_if(&mut self, addr: SocketAddr) {
        if self.syncer == Some(addr) {
            self.syncer = None;
            self.controller = None;
            // The next peer to reach Ready is promoted on its own
            // HandshakeComplete event; outstanding in-flight requests for
            // the old syncer are never re-dispatched (idempotent inserts
            // absorb the overlap once the new syncer restarts from tip).
            if let Some(next) = self.peers.iter().find(|(a, e)| **a != addr && e.ready).map(|(a, _)| *a) {
                self.promote_syncer(next);
            }
        }
    }

    fn flush_pending_outbound(&mut self) {
        if self.pending_outbound.is_empty() || self.peers.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.pending_outbound);
        for tx in pending {
            self.broadcast_transaction(tx);
        }
    }

    fn broadcast_transaction(&mut self, tx: TxMessage) {
        if self.peers.is_empty() {
            self.pending_outbound.push(tx);
            return;
        }
        for entry in self.peers.values() {
            entry.handle.send_transaction(tx.clone());
        }
    }

    async fn handle_controller_events(&mut self, addr: SocketAddr, events: Vec<SyncControllerEvent>) {
        let Some(entry) = self.peers.get(&addr) else { return };
        for event in events {
            match event {
                SyncControllerEvent::SendGetHeaders(msg) => {
                    entry.handle.send(PeerCommand::Send(Message::GetHeaders(msg)));
                }
                SyncControllerEvent::SendGetData(msg) => {
                    entry.handle.send(PeerCommand::Send(Message::GetData(msg)));
                }
                SyncControllerEvent::BlockCommitted { height, .. } => {
                    self.delegate
                        .sync_state_changed(SyncState::Syncing { progress: progress_estimate(height) });
                }
                SyncControllerEvent::CheckpointReached { height, hash } => {
                    info!(height, hash = %hex::encode(hash), "checkpoint reached");
                }
                SyncControllerEvent::ReachedTip => {
                    self.delegate.sync_state_changed(SyncState::Synced);
                }
            }
        }
    }

    async fn on_peer_event(&mut self, addr: SocketAddr, event: PeerEvent) {
        match event {
            PeerEvent::Connected => {}
            PeerEvent::HandshakeComplete { .. } => {
                if let Some(entry) = self.peers.get_mut(&addr) {
                    entry.ready = true;
                }
                self.promote_syncer(addr);
                self.flush_pending_outbound();
            }
            PeerEvent::Message(Message::Headers(h)) if Some(addr) == self.syncer => {
                if let Some(controller) = self.controller.as_mut() {
                    let events = controller.process_headers(&h.headers);
                    self.handle_controller_events(addr, events).await;
                }
            }
            PeerEvent::Message(Message::MerkleBlock(mb)) if Some(addr) == self.syncer => {
                if let Some(controller) = self.controller.as_mut() {
                    if let Err(e) = controller.process_merkleblock(mb) {
                        warn!(error = %e, "merkle block rejected, dropping syncer");
                        if let Some(entry) = self.peers.get(&addr) {
                            entry.handle.disconnect();
                        }
                    }
                }
            }
            PeerEvent::Message(Message::Tx(tx)) if Some(addr) == self.syncer => {
                self.delegate.transaction_received(&tx);
                let complete = self
                    .controller
                    .as_mut()
                    .map(|c| c.process_tx(tx))
                    .unwrap_or(false);
                if complete {
                    self.commit_syncer_block(addr).await;
                }
            }
            PeerEvent::Message(Message::Tx(tx)) => {
                // Transactions from a non-syncing peer are still handed
                // to the delegate (e.g. ones the caller itself relayed).
                self.delegate.transaction_received(&tx);
            }
            PeerEvent::Message(_) => {}
            PeerEvent::Dropped { reason } => {
                warn!(%addr, reason, "peer dropped");
                self.peers.remove(&addr);
                self.demote_syncer_if(addr);
                if self.running {
                    self.fill_connections().await;
                }
            }
        }
    }

    async fn commit_syncer_block(&mut self, addr: SocketAddr) {
        let Some(controller) = self.controller.as_mut() else { return };
        match controller.commit_pending().await {
            Ok(Some(event)) => self.handle_controller_events(addr, vec![event]).await,
            Ok(None) => {}
            Err(e) => warn!(error = %e, "failed to commit pending block"),
        }
    }

    async fn check_quiescence(&mut self) {
        let Some(addr) = self.syncer else { return };
        let quiescent = self
            .controller
            .as_ref()
            .map(|c| c.assembly_quiescent())
            .unwrap_or(false);
        if quiescent {
            self.commit_syncer_block(addr).await;
        }
    }

    async fn run(mut self, mut command_rx: mpsc::UnboundedReceiver<Command>) {
        let mut quiescence_tick = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                command = command_rx.recv() => {
                    match command {
                        Some(Command::Start) => {
                            self.running = true;
                            self.delegate.peer_group_started();
                            self.fill_connections().await;
                        }
                        Some(Command::Stop) => {
                            self.running = false;
                            for entry in self.peers.values() {
                                entry.handle.disconnect();
                            }
                            self.peers.clear();
                            self.syncer = None;
                            self.controller = None;
                            self.delegate.peer_group_stopped();
                        }
                        Some(Command::AddFilter(element)) => {
                            self.filter_elements.push(element);
                        }
                        Some(Command::SendTransaction(tx)) => {
                            self.broadcast_transaction(tx);
                        }
                        Some(Command::PeerConnected { addr, handle }) => {
                            self.peers.insert(addr, PeerEntry { handle, ready: false });
                        }
                        Some(Command::ConnectFailed { .. }) => {
                            if self.running {
                                self.fill_connections().await;
                            }
                        }
                        Some(Command::PeerEvent { addr, event }) => {
                            self.on_peer_event(addr, event).await;
                        }
                        None => return,
                    }
                }
                _ = quiescence_tick.tick() => {
                    self.check_quiescence().await;
                }
            }
        }
    }
}

fn progress_estimate(height: u32) -> f64 {
    // Without a peer-advertised chain height this can only report
    // monotonic forward motion, not a true fraction; callers wanting a
    // real [0,1] estimate should compare against their own last-known
    // network tip.
    let _ = height;
    0.5
}

/// Manages a pool of peers for one network, electing a single syncing
/// peer and fanning outbound transactions to every connection.
pub struct PeerGroup {
    command_tx: mpsc::UnboundedSender<Command>,
}

impl PeerGroup {
    /// Construct a peer group against `chain`'s network, bounded to
    /// `max_connections` simultaneous peers, notifying `delegate` of
    /// lifecycle events.
    pub fn new(
        chain: BlockChain,
        max_connections: usize,
        config: ClientConfig,
        delegate: Arc<dyn PeerGroupDelegate>,
    ) -> Self {
        Self::with_mode(chain, max_connections, config, delegate, false)
    }

    fn with_mode(
        chain: BlockChain,
        max_connections: usize,
        config: ClientConfig,
        delegate: Arc<dyn PeerGroupDelegate>,
        only_checkpoints: bool,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let actor = Actor {
            chain,
            config,
            max_connections,
            only_checkpoints,
            delegate,
            command_tx: command_tx.clone(),
            peers: HashMap::new(),
            syncer: None,
            controller: None,
            filter_elements: Vec::new(),
            pending_outbound: Vec::new(),
            seed_cursor: 0,
            running: false,
        };
        tokio::spawn(actor.run(command_rx));
        Self { command_tx }
    }

    /// Connect to peers and begin full (merkle-block) synchronization.
    pub fn start(&self) {
        let _ = self.command_tx.send(Command::Start);
    }

    /// Detach every peer's callback and close its socket. Idempotent.
    pub fn stop(&self) {
        let _ = self.command_tx.send(Command::Stop);
    }

    /// Add an element (address hash, outpoint, script) to the bloom
    /// filter installed on the syncing peer.
    pub fn add_filter(&self, element: Vec<u8>) {
        let _ = self.command_tx.send(Command::AddFilter(element));
    }

    /// Relay a signed transaction to every connected peer, or queue it
    /// until the first peer becomes ready if none are connected yet.
    pub fn send_transaction(&self, tx: TxMessage) {
        let _ = self.command_tx.send(Command::SendTransaction(tx));
    }
}

/// A degenerate `PeerGroup` that walks headers at checkpoint cadence
/// only, never requesting merkle-blocks, sharing the exact header-walk
/// path `PeerGroup` uses for full sync (see `chain::SyncController`).
pub struct CheckpointSyncer {
    group: PeerGroup,
}

struct FinishDelegate<F: Fn(SyncState) + Send + Sync> {
    inner: F,
}

impl<F: Fn(SyncState) + Send + Sync> PeerGroupDelegate for FinishDelegate<F> {
    fn sync_state_changed(&self, state: SyncState) {
        (self.inner)(state);
    }
}

impl CheckpointSyncer {
    /// `on_finish` fires once header-only sync reaches the peer's
    /// reported tip.
    pub fn new<F>(chain: BlockChain, max_connections: usize, config: ClientConfig, on_finish: F) -> Self
    where
        F: Fn(SyncState) + Send + Sync + 'static,
    {
        let delegate = Arc::new(FinishDelegate { inner: on_finish });
        let group = PeerGroup::with_mode(chain, max_connections, config, delegate, true);
        Self { group }
    }

    pub fn start(&self) {
        self.group.start();
    }

    pub fn stop(&self) {
        self.group.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingDelegate {
        events: std::sync::Mutex<Vec<String>>,
    }

    impl PeerGroupDelegate for RecordingDelegate {
        fn peer_group_started(&self) {
            self.events.lock().unwrap().push("started".to_string());
        }
        fn peer_group_stopped(&self) {
            self.events.lock().unwrap().push("stopped".to_string());
        }
    }

    fn test_chain() -> BlockChain {
        BlockChain::new(crate::store::Store::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn start_and_stop_notify_delegate() {
        let delegate = Arc::new(RecordingDelegate { events: std::sync::Mutex::new(Vec::new()) });
        let group = PeerGroup::new(
            test_chain(),
            0, // no DNS seeds on the test network, so no peers actually connect
            ClientConfig::for_network(crate::config::BITCOIN_REGTEST),
            delegate.clone(),
        );
        group.start();
        group.stop();
        // Give the actor task a tick to process both commands.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let events = delegate.events.lock().unwrap().clone();
        assert_eq!(events, vec!["started".to_string(), "stopped".to_string()]);
    }

    #[tokio::test]
    async fn queued_transaction_is_not_lost_with_no_peers() {
        let delegate = Arc::new(RecordingDelegate { events: std::sync::Mutex::new(Vec::new()) });
        let group = PeerGroup::new(
            test_chain(),
            0,
            ClientConfig::for_network(crate::config::BITCOIN_REGTEST),
            delegate,
        );
        let tx = TxMessage { version: 1, inputs: vec![], outputs: vec![], lock_time: 0 };
        // No peers connected; this must not panic or drop the send.
        group.send_transaction(tx);
    }
}
