//! Server network layer: socket tasks feeding the single engine loop
//!
//! Socket I/O runs in background tasks that talk to the loop over channels.
//! The inbound one is bounded by `recv_queue`: datagrams arriving while it is
//! full are dropped, and stream readers wait for room. The loop itself owns
//! the [`SyncEngine`] and is the only place any table gets mutated.

use crate::engine::{GameMessage, ServerConfig, SyncEngine};
use log::{debug, error, info, warn};
use shared::transport::{frame, FrameBuffer};
use shared::{CancelToken, TransportKind, MAX_PACKET_SIZE};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};

/// Messages sent from network tasks to the server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { data: Vec<u8>, addr: SocketAddr },
    /// A stream peer went away without a disconnection notice
    PeerClosed { addr: SocketAddr },
}

/// Work for the sender task
#[derive(Debug)]
enum Outbound {
    Packet { bytes: Vec<u8>, addr: SocketAddr },
    Register { addr: SocketAddr, writer: OwnedWriteHalf },
    Close { addr: SocketAddr },
}

/// Main server coordinating the transport and the synchronization engine
pub struct Server {
    engine: SyncEngine,
    local_addr: SocketAddr,

    server_rx: mpsc::Receiver<ServerMessage>,
    outbound_tx: mpsc::UnboundedSender<Outbound>,

    receiver: JoinHandle<()>,
    sender: JoinHandle<()>,
}

impl Server {
    /// Binds the configured transport and starts the socket tasks
    pub async fn bind(config: ServerConfig) -> io::Result<Self> {
        let (server_tx, server_rx) = mpsc::channel(config.recv_queue.max(1));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let address = config.bind_addr();

        let (local_addr, receiver, sender) = match config.transport {
            TransportKind::Udp => {
                let socket = Arc::new(UdpSocket::bind(&address).await?);
                let local_addr = socket.local_addr()?;
                (
                    local_addr,
                    spawn_udp_receiver(Arc::clone(&socket), server_tx),
                    spawn_udp_sender(socket, outbound_rx),
                )
            }
            TransportKind::Tcp => {
                let listener = TcpListener::bind(&address).await?;
                let local_addr = listener.local_addr()?;
                (
                    local_addr,
                    spawn_tcp_acceptor(listener, server_tx, outbound_tx.clone()),
                    spawn_tcp_sender(outbound_rx),
                )
            }
        };

        info!(
            "Server listening on {} ({:?}, max {} players)",
            local_addr, config.transport, config.max_players
        );

        Ok(Server {
            engine: SyncEngine::new(config),
            local_addr,
            server_rx,
            outbound_tx,
            receiver,
            sender,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// Runs the loop until the game ends or `cancel` fires
    ///
    /// On the way out every peer gets a disconnection notice and the sender
    /// task is given the chance to flush it.
    pub async fn run(mut self, cancel: CancelToken) -> io::Result<()> {
        let mut period = self.engine.tick_interval();
        let mut tick_interval = make_interval(period);

        // The first tick fires immediately
        tick_interval.tick().await;

        info!("Server started successfully");

        loop {
            tick_interval.tick().await;

            self.drain_incoming();

            let messages = self.engine.tick(Instant::now());
            self.dispatch(messages);

            if cancel.is_cancelled() {
                info!("Shutdown requested");
                break;
            }
            if self.engine.is_finished() {
                info!("Game over, closing the server");
                break;
            }

            if self.engine.tick_interval() != period {
                period = self.engine.tick_interval();
                debug!("Switching loop period to {:?}", period);
                tick_interval = make_interval(period);
            }
        }

        let farewell = self.engine.shutdown_messages();
        self.dispatch(farewell);

        self.receiver.abort();
        drop(self.outbound_tx);
        if let Err(e) = self.sender.await {
            error!("Sender task failed: {}", e);
        }

        info!("Server stopped");
        Ok(())
    }

    /// Handles at most `recv_budget` pending packets
    fn drain_incoming(&mut self) {
        for _ in 0..self.engine.config().recv_budget {
            let Ok(message) = self.server_rx.try_recv() else {
                break;
            };

            let now = Instant::now();
            let replies = match message {
                ServerMessage::PacketReceived { data, addr } => {
                    self.engine.handle_datagram(addr, &data, now)
                }
                ServerMessage::PeerClosed { addr } => {
                    info!("Stream from {} closed", addr);
                    let replies = self.engine.disconnect_peer(&addr, now);
                    self.queue(Outbound::Close { addr });
                    replies
                }
            };
            self.dispatch(replies);
        }
    }

    fn dispatch(&self, messages: Vec<GameMessage>) {
        for message in messages {
            match message {
                GameMessage::SendPacket { packet, addr } => {
                    self.queue(Outbound::Packet {
                        bytes: packet.encode(),
                        addr,
                    });
                }
                GameMessage::BroadcastPacket { packet } => {
                    let bytes = packet.encode();
                    for addr in self.engine.clients().get_client_addrs() {
                        self.queue(Outbound::Packet {
                            bytes: bytes.clone(),
                            addr,
                        });
                    }
                }
            }
        }
    }

    fn queue(&self, outbound: Outbound) {
        if let Err(e) = self.outbound_tx.send(outbound) {
            error!("Failed to queue outgoing packet: {}", e);
        }
    }
}

fn make_interval(period: Duration) -> Interval {
    let mut tick_interval = interval(period);
    tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tick_interval
}

/// Spawns task that continuously listens for incoming datagrams
///
/// Never waits on the loop: a datagram that finds the queue full is dropped.
fn spawn_udp_receiver(
    socket: Arc<UdpSocket>,
    server_tx: mpsc::Sender<ServerMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buffer = [0u8; MAX_PACKET_SIZE];
        let mut dropped: u64 = 0;

        loop {
            match socket.recv_from(&mut buffer).await {
                Ok((len, addr)) => {
                    let message = ServerMessage::PacketReceived {
                        data: buffer[..len].to_vec(),
                        addr,
                    };
                    match server_tx.try_send(message) {
                        Ok(()) => {
                            if dropped > 0 {
                                warn!(
                                    "Dropped {} datagrams while the queue was full",
                                    dropped
                                );
                                dropped = 0;
                            }
                        }
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            if dropped == 0 {
                                warn!(
                                    "Receive queue full, dropping datagrams (first from {})",
                                    addr
                                );
                            }
                            dropped += 1;
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => {
                            error!("Main loop is gone, stopping receiver");
                            break;
                        }
                    }
                }
                Err(e) => {
                    error!("Error receiving packet: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    })
}

/// Spawns task that processes the outgoing packet queue
fn spawn_udp_sender(
    socket: Arc<UdpSocket>,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(outbound) = outbound_rx.recv().await {
            if let Outbound::Packet { bytes, addr } = outbound {
                if let Err(e) = socket.send_to(&bytes, addr).await {
                    error!("Failed to send packet to {}: {}", addr, e);
                }
            }
        }
    })
}

fn spawn_tcp_acceptor(
    listener: TcpListener,
    server_tx: mpsc::Sender<ServerMessage>,
    outbound_tx: mpsc::UnboundedSender<Outbound>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let (stream, addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    continue;
                }
            };

            if let Err(e) = stream.set_nodelay(true) {
                warn!("Could not disable Nagle for {}: {}", addr, e);
            }
            debug!("Stream opened from {}", addr);

            let (reader, writer) = stream.into_split();
            if outbound_tx.send(Outbound::Register { addr, writer }).is_err() {
                break;
            }
            tokio::spawn(read_frames(reader, addr, server_tx.clone()));
        }
    })
}

/// Splits one stream into packets until it closes or desyncs
///
/// Waits for room in the queue, which stalls the stream instead of growing it.
async fn read_frames(
    mut reader: OwnedReadHalf,
    addr: SocketAddr,
    server_tx: mpsc::Sender<ServerMessage>,
) {
    let mut frames = FrameBuffer::new();
    let mut buffer = [0u8; MAX_PACKET_SIZE];

    'stream: loop {
        let len = match reader.read(&mut buffer).await {
            Ok(0) => break,
            Ok(len) => len,
            Err(e) => {
                debug!("Read from {} failed: {}", addr, e);
                break;
            }
        };
        frames.extend(&buffer[..len]);

        loop {
            match frames.next_frame() {
                Ok(Some(data)) => {
                    if server_tx
                        .send(ServerMessage::PacketReceived { data, addr })
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Closing stream from {}: {}", addr, e);
                    break 'stream;
                }
            }
        }
    }

    let _ = server_tx.send(ServerMessage::PeerClosed { addr }).await;
}

fn spawn_tcp_sender(mut outbound_rx: mpsc::UnboundedReceiver<Outbound>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut writers: HashMap<SocketAddr, OwnedWriteHalf> = HashMap::new();

        while let Some(outbound) = outbound_rx.recv().await {
            match outbound {
                Outbound::Register { addr, writer } => {
                    writers.insert(addr, writer);
                }
                Outbound::Close { addr } => {
                    writers.remove(&addr);
                }
                Outbound::Packet { bytes, addr } => {
                    let Some(writer) = writers.get_mut(&addr) else {
                        debug!("No stream for {}, dropping packet", addr);
                        continue;
                    };
                    if let Err(e) = writer.write_all(&frame(&bytes)).await {
                        error!("Failed to send packet to {}: {}", addr, e);
                        writers.remove(&addr);
                    }
                }
            }
        }

        for (_, mut writer) in writers {
            let _ = writer.shutdown().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Packet;
    use tokio::net::TcpStream;

    fn test_config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_server_message_creation() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let msg = ServerMessage::PacketReceived {
            data: Packet::ConnectionRequest.encode(),
            addr,
        };

        match msg {
            ServerMessage::PacketReceived { data, addr: a } => {
                assert_eq!(a, addr);
                assert_eq!(Packet::decode(&data).unwrap(), Packet::ConnectionRequest);
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[tokio::test]
    async fn test_full_queue_drops_excess_datagrams() {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let server_addr = socket.local_addr().unwrap();
        let (server_tx, mut server_rx) = mpsc::channel(4);
        let receiver = spawn_udp_receiver(socket, server_tx);

        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        for _ in 0..20 {
            peer.send_to(&Packet::Ping.encode(), server_addr).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(200)).await;

        // Only the queue's capacity survives; the rest was never buffered
        let mut queued = 0;
        while server_rx.try_recv().is_ok() {
            queued += 1;
        }
        assert_eq!(queued, 4);

        // Room again: new datagrams get through immediately
        peer.send_to(&Packet::Pong.encode(), server_addr).await.unwrap();
        let message = tokio::time::timeout(Duration::from_secs(2), server_rx.recv())
            .await
            .unwrap()
            .unwrap();
        match message {
            ServerMessage::PacketReceived { data, .. } => {
                assert_eq!(Packet::decode(&data).unwrap(), Packet::Pong);
            }
            other => panic!("Unexpected message {:?}", other),
        }

        receiver.abort();
    }

    #[tokio::test]
    async fn test_udp_connect_roundtrip() {
        let server = Server::bind(test_config()).await.unwrap();
        let server_addr = server.local_addr();
        let cancel = CancelToken::new();
        let handle = tokio::spawn(server.run(cancel.clone()));

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        socket
            .send_to(&Packet::ConnectionRequest.encode(), server_addr)
            .await
            .unwrap();

        let mut buffer = [0u8; MAX_PACKET_SIZE];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buffer))
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            Packet::decode(&buffer[..len]).unwrap(),
            Packet::ConnectionAccepted { .. }
        ));

        cancel.cancel();
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buffer))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(Packet::decode(&buffer[..len]).unwrap(), Packet::Disconnection);

        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_tcp_frames_roundtrip() {
        let server = Server::bind(ServerConfig {
            transport: TransportKind::Tcp,
            ..test_config()
        })
        .await
        .unwrap();
        let server_addr = server.local_addr();
        let cancel = CancelToken::new();
        let handle = tokio::spawn(server.run(cancel.clone()));

        let mut stream = TcpStream::connect(server_addr).await.unwrap();
        stream
            .write_all(&frame(&Packet::ConnectionRequest.encode()))
            .await
            .unwrap();

        let mut frames = FrameBuffer::new();
        let mut buffer = [0u8; MAX_PACKET_SIZE];
        let packet = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let len = stream.read(&mut buffer).await.unwrap();
                frames.extend(&buffer[..len]);
                if let Some(data) = frames.next_frame().unwrap() {
                    return Packet::decode(&data).unwrap();
                }
            }
        })
        .await
        .unwrap();
        assert!(matches!(packet, Packet::ConnectionAccepted { .. }));

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }
}
