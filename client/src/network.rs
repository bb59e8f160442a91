use crate::input::InputManager;
use crate::session::{ClientPhase, ClientSession};
use log::{error, info, warn};
use shared::transport::{frame, FrameBuffer};
use shared::{CancelToken, Packet, TransportKind, MAX_PACKET_SIZE};
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::{interval, MissedTickBehavior};

/// Socket to the server, datagram or length-framed stream
pub enum Connection {
    Udp(UdpSocket),
    Tcp {
        reader: OwnedReadHalf,
        writer: OwnedWriteHalf,
        frames: FrameBuffer,
    },
}

impl Connection {
    pub async fn open(server_addr: SocketAddr, transport: TransportKind) -> io::Result<Self> {
        match transport {
            TransportKind::Udp => {
                let bind_addr: SocketAddr = if server_addr.is_ipv4() {
                    ([0, 0, 0, 0], 0).into()
                } else {
                    ([0u16; 8], 0).into()
                };
                let socket = UdpSocket::bind(bind_addr).await?;
                socket.connect(server_addr).await?;
                Ok(Connection::Udp(socket))
            }
            TransportKind::Tcp => {
                let stream = TcpStream::connect(server_addr).await?;
                stream.set_nodelay(true)?;
                let (reader, writer) = stream.into_split();
                Ok(Connection::Tcp {
                    reader,
                    writer,
                    frames: FrameBuffer::new(),
                })
            }
        }
    }

    pub async fn send(&mut self, packet: &Packet) -> io::Result<()> {
        let bytes = packet.encode();
        match self {
            Connection::Udp(socket) => {
                socket.send(&bytes).await?;
            }
            Connection::Tcp { writer, .. } => {
                writer.write_all(&frame(&bytes)).await?;
            }
        }
        Ok(())
    }

    /// Next packet's raw bytes; `None` once a stream is closed
    ///
    /// Cancel safe: bytes are only buffered after a read completed.
    pub async fn recv(&mut self, buffer: &mut [u8]) -> io::Result<Option<Vec<u8>>> {
        match self {
            Connection::Udp(socket) => {
                let len = socket.recv(buffer).await?;
                Ok(Some(buffer[..len].to_vec()))
            }
            Connection::Tcp { reader, frames, .. } => loop {
                if let Some(data) = frames
                    .next_frame()
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?
                {
                    return Ok(Some(data));
                }

                let len = reader.read(buffer).await?;
                if len == 0 {
                    return Ok(None);
                }
                frames.extend(&buffer[..len]);
            },
        }
    }
}

/// Headless client: protocol session, scripted input and the socket
pub struct Client {
    connection: Connection,
    session: ClientSession,
    input_manager: InputManager,
    tick_duration: Duration,
}

impl Client {
    pub async fn new(
        server_addr: SocketAddr,
        transport: TransportKind,
        session: ClientSession,
        input_manager: InputManager,
        tick_rate: u32,
    ) -> io::Result<Self> {
        let connection = Connection::open(server_addr, transport).await?;
        info!("Opened {:?} connection to {}", transport, server_addr);

        Ok(Client {
            connection,
            session,
            input_manager,
            tick_duration: Duration::from_secs_f64(1.0 / f64::from(tick_rate.max(1))),
        })
    }

    pub fn session(&self) -> &ClientSession {
        &self.session
    }

    async fn send_packet(&mut self, packet: &Packet) {
        if let Err(e) = self.connection.send(packet).await {
            error!("Error sending {:?}: {}", packet.tag(), e);
        }
    }

    async fn send_all(&mut self, packets: Vec<Packet>) {
        for packet in packets {
            self.send_packet(&packet).await;
        }
    }

    /// Scripted controls for one tick
    async fn drive(&mut self, now: Instant) {
        if self.session.phase() != ClientPhase::InGame {
            return;
        }

        if let Some(events) = self.input_manager.update(now) {
            if let Some(packet) = self.session.input(&events) {
                self.send_packet(&packet).await;
            }
        }

        if self.input_manager.should_shoot(now) {
            if let Some(packet) = self.session.shoot() {
                self.send_packet(&packet).await;
            }
        }
    }

    /// Runs until the session finishes or `cancel` fires, then says goodbye
    pub async fn run(mut self, cancel: CancelToken) -> io::Result<ClientSession> {
        let request = self.session.connect(Instant::now());
        self.send_packet(&request).await;

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut buffer = [0u8; MAX_PACKET_SIZE];

        loop {
            tokio::select! {
                result = self.connection.recv(&mut buffer) => {
                    match result {
                        Ok(Some(data)) => {
                            let replies = self.session.handle_datagram(&data, Instant::now());
                            self.send_all(replies).await;
                        }
                        Ok(None) => {
                            warn!("Server closed the connection");
                            break;
                        }
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let packets = self.session.tick(now);
                    self.send_all(packets).await;
                    self.drive(now).await;

                    if cancel.is_cancelled() {
                        info!("Shutdown requested");
                        break;
                    }
                },
            }

            if self.session.is_finished() {
                break;
            }
        }

        if let Some(notice) = self.session.disconnect() {
            self.send_packet(&notice).await;
        }

        let own = self.session.entity_id();
        info!(
            "Client stopped (entity {:?}, average ping {:?})",
            own,
            self.session.latency().average()
        );
        Ok(self.session)
    }
}
