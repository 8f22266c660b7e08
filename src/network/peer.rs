//! A single peer connection: handshake, idle/pong liveness, and the
//! sync-request surface a controller drives.
//!
//! Follows the split-task shape used throughout this crate for anything
//! socket-backed: one task owns the `Framed` read half and turns inbound
//! frames into [`PeerEvent`]s on an unbounded channel, a second owns the
//! write half and drains an unbounded command channel. [`PeerHandle`]
//! holds only the command sender plus cheap, atomically-updated
//! statistics — never the socket itself.

use std::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use rand::RngCore;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

use crate::config::{ClientConfig, Network};
use crate::error::{Error, TimeoutError};
use crate::network::bloom::BloomFilter;
use crate::network::codec::MessageCodec;
use crate::network::protocol::{
    GetHeadersMessage, Message, NetworkAddress, PingMessage, PongMessage, TxMessage,
    VersionMessage,
};
use crate::utils::current_timestamp;

/// User-agent prefix this client refuses to sync from (spec-mandated
/// known-bad peer).
const BANNED_USER_AGENT_PREFIX: &str = "Bitcoin ABC:0.16";

/// The peer connection state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Disconnected,
    Connecting,
    VersionSent,
    VersionAcked,
    Ready,
    Syncing,
    Dropped,
}

impl PeerState {
    fn from_code(code: u8) -> Self {
        match code {
            0 => PeerState::Disconnected,
            1 => PeerState::Connecting,
            2 => PeerState::VersionSent,
            3 => PeerState::VersionAcked,
            4 => PeerState::Ready,
            5 => PeerState::Syncing,
            _ => PeerState::Dropped,
        }
    }

    fn code(self) -> u8 {
        match self {
            PeerState::Disconnected => 0,
            PeerState::Connecting => 1,
            PeerState::VersionSent => 2,
            PeerState::VersionAcked => 3,
            PeerState::Ready => 4,
            PeerState::Syncing => 5,
            PeerState::Dropped => 6,
        }
    }
}

/// Events a peer task emits toward its controller (normally a
/// `PeerGroup`), in the order produced by that peer's socket.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    Connected,
    HandshakeComplete { user_agent: String },
    Message(Message),
    Dropped { reason: String },
}

/// Commands a controller sends to drive a connected peer.
#[derive(Debug, Clone)]
pub enum PeerCommand {
    StartSync {
        filter_elements: Vec<Vec<u8>>,
        latest_hash: [u8; 32],
        only_checkpoints: bool,
    },
    SendTransaction(TxMessage),
    Send(Message),
    Disconnect,
}

/// Cheap, shareable per-peer statistics, updated from the read/write
/// tasks via atomics so a controller can inspect them without awaiting.
#[derive(Debug, Default)]
pub struct PeerStats {
    pub bytes_sent: AtomicU64,
    pub bytes_recv: AtomicU64,
    pub last_send: AtomicI64,
    pub last_recv: AtomicI64,
    state: AtomicU8,
}

impl PeerStats {
    fn set_state(&self, state: PeerState) {
        self.state.store(state.code(), Ordering::Relaxed);
    }
}

/// A controller-facing handle to a running peer task pair.
pub struct PeerHandle {
    pub addr: std::net::SocketAddr,
    pub stats: Arc<PeerStats>,
    command_tx: mpsc::UnboundedSender<PeerCommand>,
}

impl PeerHandle {
    pub fn send(&self, command: PeerCommand) {
        // The peer task drains this channel until it observes
        // `Disconnect` or the socket closes; a send error here means the
        // peer already dropped, which the controller learns about
        // through `PeerEvent::Dropped` instead of this return value.
        let _ = self.command_tx.send(command);
    }

    pub fn start_sync(&self, filter_elements: Vec<Vec<u8>>, latest_hash: [u8; 32], only_checkpoints: bool) {
        self.send(PeerCommand::StartSync { filter_elements, latest_hash, only_checkpoints });
    }

    pub fn send_transaction(&self, tx: TxMessage) {
        self.send(PeerCommand::SendTransaction(tx));
    }

    pub fn disconnect(&self) {
        self.send(PeerCommand::Disconnect);
    }

    pub fn state(&self) -> PeerState {
        PeerState::from_code(self.stats.state.load(Ordering::Relaxed))
    }
}

fn local_network_address() -> NetworkAddress {
    NetworkAddress { services: 0, ip: [0u8; 16], port: 0 }
}

fn version_message(config: &ClientConfig, peer_addr: std::net::SocketAddr) -> VersionMessage {
    let ip = match peer_addr.ip() {
        std::net::IpAddr::V4(v4) => v4.to_ipv6_mapped().octets(),
        std::net::IpAddr::V6(v6) => v6.octets(),
    };
    VersionMessage {
        version: 70015,
        services: 0,
        timestamp: current_timestamp() as i64,
        addr_recv: NetworkAddress { services: 0, ip, port: peer_addr.port() },
        addr_from: local_network_address(),
        nonce: rand::thread_rng().next_u64(),
        user_agent: config.user_agent.clone(),
        start_height: 0,
        relay: true,
    }
}

/// Connect to `addr` and run the peer's read/write tasks until dropped,
/// returning a handle plus the event stream the controller consumes.
pub async fn connect(
    addr: std::net::SocketAddr,
    network: Network,
    config: ClientConfig,
) -> std::io::Result<(PeerHandle, mpsc::UnboundedReceiver<PeerEvent>)> {
    let stream = TcpStream::connect(addr).await?;
    Ok(spawn(stream, addr, network, config))
}

/// Internal instruction the read task sends to the write task; distinct
/// from [`PeerCommand`] since some of these (the handshake `verack`, the
/// liveness `ping`) are never issued by a controller.
enum Internal {
    FromController(PeerCommand),
    SendVerack,
    SendPing(u64),
}

/// Wrap an already-connected socket and spawn its read/write tasks.
/// Split from [`connect`] so tests can drive the state machine over an
/// in-memory duplex stream instead of a real TCP socket.
pub fn spawn(
    stream: TcpStream,
    addr: std::net::SocketAddr,
    network: Network,
    config: ClientConfig,
) -> (PeerHandle, mpsc::UnboundedReceiver<PeerEvent>) {
    let framed = Framed::new(stream, MessageCodec::new(network.magic));
    let (mut sink, mut stream) = framed.split();

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (command_tx, mut command_rx) = mpsc::unbounded_channel::<PeerCommand>();
    let (internal_tx, mut internal_rx) = mpsc::unbounded_channel::<Internal>();
    let stats = Arc::new(PeerStats::default());
    stats.set_state(PeerState::Connecting);

    // Bridge controller commands into the same internal queue the write
    // task drains, so handshake/liveness replies never race controller
    // sends for ordering on the wire.
    tokio::spawn({
        let internal_tx = internal_tx.clone();
        async move {
            while let Some(command) = command_rx.recv().await {
                if internal_tx.send(Internal::FromController(command)).is_err() {
                    return;
                }
            }
        }
    });

    let write_stats = stats.clone();
    let handshake_timeout = config.handshake_timeout;
    let idle_timeout = config.idle_timeout;
    let pong_timeout = config.pong_timeout;
    tokio::spawn(async move {
        let our_version = version_message(&config, addr);
        if sink.send(Message::Version(our_version)).await.is_err() {
            return;
        }
        write_stats.last_send.store(current_timestamp() as i64, Ordering::Relaxed);
        write_stats.set_state(PeerState::VersionSent);

        while let Some(command) = internal_rx.recv().await {
            let message = match command {
                Internal::SendVerack => Message::Verack,
                Internal::SendPing(nonce) => Message::Ping(PingMessage { nonce }),
                Internal::FromController(PeerCommand::Send(msg)) => msg,
                Internal::FromController(PeerCommand::SendTransaction(tx)) => Message::Tx(tx),
                Internal::FromController(PeerCommand::StartSync {
                    filter_elements,
                    latest_hash,
                    only_checkpoints: _,
                }) => {
                    let mut filter = if filter_elements.is_empty() {
                        BloomFilter::empty()
                    } else {
                        BloomFilter::new(filter_elements.len())
                    };
                    for element in &filter_elements {
                        filter.insert(element);
                    }
                    let filterload = Message::FilterLoad(crate::network::protocol::FilterLoadMessage {
                        filter: filter.filter_bytes().to_vec(),
                        n_hash_funcs: filter.n_hash_funcs(),
                        tweak: filter.tweak(),
                        flags: 0,
                    });
                    if sink.send(filterload).await.is_err() {
                        return;
                    }
                    Message::GetHeaders(GetHeadersMessage {
                        version: 70015,
                        locator_hashes: vec![latest_hash],
                        hash_stop: [0u8; 32],
                    })
                }
                Internal::FromController(PeerCommand::Disconnect) => return,
            };
            if sink.send(message).await.is_err() {
                return;
            }
            write_stats.last_send.store(current_timestamp() as i64, Ordering::Relaxed);
        }
    });

    let read_stats = stats.clone();
    tokio::spawn(async move {
        let _ = event_tx.send(PeerEvent::Connected);

        let mut handshake_deadline = Some(tokio::time::Instant::now() + handshake_timeout);
        let mut awaiting_pong: Option<(u64, tokio::time::Instant)> = None;
        let mut peer_user_agent = String::new();

        loop {
            let next_wake = match awaiting_pong {
                Some((_, deadline)) => deadline,
                None => tokio::time::Instant::now() + idle_timeout,
            };

            tokio::select! {
                result = stream.next() => {
                    match result {
                        Some(Ok(message)) => {
                            read_stats.last_recv.store(current_timestamp() as i64, Ordering::Relaxed);

                            match &message {
                                Message::Version(v) => {
                                    if v.user_agent.starts_with(BANNED_USER_AGENT_PREFIX) {
                                        warn!(user_agent = %v.user_agent, "peer on known-bad user-agent list, dropping");
                                        read_stats.set_state(PeerState::Dropped);
                                        let _ = event_tx.send(PeerEvent::Dropped {
                                            reason: format!("banned user-agent: {}", v.user_agent),
                                        });
                                        return;
                                    }
                                    peer_user_agent = v.user_agent.clone();
                                    read_stats.set_state(PeerState::VersionAcked);
                                    let _ = internal_tx.send(Internal::SendVerack);
                                }
                                Message::Verack => {
                                    handshake_deadline = None;
                                    read_stats.set_state(PeerState::Ready);
                                    let _ = event_tx.send(PeerEvent::HandshakeComplete {
                                        user_agent: peer_user_agent.clone(),
                                    });
                                }
                                Message::Ping(PingMessage { nonce }) => {
                                    debug!(nonce, "received ping");
                                    let _ = internal_tx.send(Internal::SendPing(*nonce));
                                }
                                Message::Pong(PongMessage { nonce }) => {
                                    if awaiting_pong.map(|(n, _)| n) == Some(*nonce) {
                                        awaiting_pong = None;
                                    }
                                }
                                _ => {}
                            }

                            if event_tx.send(PeerEvent::Message(message)).is_err() {
                                return;
                            }
                        }
                        Some(Err(wire_error)) => {
                            read_stats.set_state(PeerState::Dropped);
                            let _ = event_tx.send(PeerEvent::Dropped { reason: wire_error.to_string() });
                            return;
                        }
                        None => {
                            read_stats.set_state(PeerState::Dropped);
                            let _ = event_tx.send(PeerEvent::Dropped { reason: "connection closed".to_string() });
                            return;
                        }
                    }
                }
                _ = tokio::time::sleep_until(next_wake) => {
                    if let Some(deadline) = handshake_deadline {
                        if tokio::time::Instant::now() >= deadline {
                            read_stats.set_state(PeerState::Dropped);
                            let _ = event_tx.send(PeerEvent::Dropped {
                                reason: Error::Timeout(TimeoutError::Handshake).to_string(),
                            });
                            return;
                        }
                    }
                    match awaiting_pong {
                        Some((_, deadline)) if tokio::time::Instant::now() >= deadline => {
                            read_stats.set_state(PeerState::Dropped);
                            let _ = event_tx.send(PeerEvent::Dropped {
                                reason: Error::Timeout(TimeoutError::Pong).to_string(),
                            });
                            return;
                        }
                        Some(_) => {}
                        None => {
                            // Idle window elapsed with no inbound traffic: send a
                            // liveness ping and wait up to the pong window for a reply.
                            let nonce = rand::thread_rng().next_u64();
                            if internal_tx.send(Internal::SendPing(nonce)).is_err() {
                                return;
                            }
                            awaiting_pong = Some((nonce, tokio::time::Instant::now() + pong_timeout));
                        }
                    }
                }
            }
        }
    });

    (
        PeerHandle { addr, stats, command_tx },
        event_rx,
    )
}

/// Whether a `version` message's user agent is on the known-bad list.
pub fn is_banned_user_agent(user_agent: &str) -> bool {
    user_agent.starts_with(BANNED_USER_AGENT_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_banned_user_agent_prefix() {
        assert!(is_banned_user_agent("Bitcoin ABC:0.16.0"));
        assert!(is_banned_user_agent("Bitcoin ABC:0.16"));
    }

    #[test]
    fn accepts_ordinary_user_agents() {
        assert!(!is_banned_user_agent("/Satoshi:25.0.0/"));
        assert!(!is_banned_user_agent("Bitcoin ABC:0.17"));
    }

    #[test]
    fn peer_state_transitions_are_distinct() {
        let states = [
            PeerState::Disconnected,
            PeerState::Connecting,
            PeerState::VersionSent,
            PeerState::VersionAcked,
            PeerState::Ready,
            PeerState::Syncing,
            PeerState::Dropped,
        ];
        for (i, a) in states.iter().enumerate() {
            for (j, b) in states.iter().enumerate() {
                assert_eq!(i == j, a == b);
            }
        }
    }

    #[test]
    fn state_code_round_trips() {
        for state in [
            PeerState::Disconnected,
            PeerState::Connecting,
            PeerState::VersionSent,
            PeerState::VersionAcked,
            PeerState::Ready,
            PeerState::Syncing,
            PeerState::Dropped,
        ] {
            assert_eq!(PeerState::from_code(state.code()), state);
        }
    }

    #[tokio::test]
    async fn handshake_completes_over_a_loopback_pair() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
        let client_stream = TcpStream::connect(addr).await.unwrap();
        let server_stream = accept.await.unwrap();

        let network = crate::config::BITCOIN_REGTEST;
        let (handle, mut events) = spawn(client_stream, addr, network, ClientConfig::for_network(network));
        let (_server_handle, mut server_events) =
            spawn(server_stream, addr, network, ClientConfig::for_network(network));

        // Drain the client's own version so the server side's write task
        // proceeds to answer it with a verack, and vice versa.
        loop {
            match events.recv().await.unwrap() {
                PeerEvent::Message(Message::Verack) => break,
                _ => continue,
            }
        }
        loop {
            match server_events.recv().await.unwrap() {
                PeerEvent::Message(Message::Verack) => break,
                _ => continue,
            }
        }
        assert_eq!(handle.state(), PeerState::Ready);
    }
}
