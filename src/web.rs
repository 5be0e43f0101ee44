use std::net::SocketAddr;
use std::sync::Arc;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{timeout, Duration};
use crate::aoim::AreaOfInterest;
use crate::buffer::convert;
use crate::config::Config;
use crate::endpoint::{Endpoint, EndpointId};
use crate::manager::ConnectionManager;
use crate::statistics::ConnectionStatistics;
use crate::system::{Result, next_endpoint_id};
use crate::websocket::{self, Frame, Message, MessageReader, Opcode, WsError, MAX_MESSAGE_SIZE};

/// Frames buffered for one web page. Once full, further messages to that
/// page are dropped until its writer catches up.
pub const OUTBOUND_QUEUE_SIZE: usize = 256;
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// One web page connected over a websocket.
pub struct WebPageConnection {
    id: EndpointId,
    peer: SocketAddr,
    outbound: Sender<Frame>,
    aoim: AreaOfInterest,
    statistics: ConnectionStatistics,
}

impl WebPageConnection {
    pub fn new(peer: SocketAddr, outbound: Sender<Frame>, aoim: AreaOfInterest) -> Self {
        WebPageConnection {
            id: next_endpoint_id(),
            peer,
            outbound,
            aoim,
            statistics: ConnectionStatistics::new(),
        }
    }

    /// Returns false when the frame was dropped because the queue is full.
    fn queue(&self, frame: Frame) -> Result<bool> {
        match self.outbound.try_send(frame) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => {
                if self.statistics.get_messages_dropped() == 0 {
                    warn!("websocket {} to {} is falling behind, dropping messages", self.id, self.peer);
                }
                self.statistics.message_dropped();
                Ok(false)
            }
            Err(TrySendError::Closed(_)) => {
                Err(format!("connection {} to {} is closed", self.id, self.peer).into())
            }
        }
    }

    async fn read_loop<R: AsyncRead + Unpin>(&self, reader: &mut MessageReader<R>, manager: &ConnectionManager) -> Result<()> {
        loop {
            let message = match reader.read_message().await {
                Ok(message) => message,
                Err(WsError::Io(e)) => return Err(e.into()),
                Err(e) => {
                    self.queue(Frame::close(Some(e.close_code())))?;
                    return Err(e.into());
                }
            };
            match message {
                Message::Text(text) => {
                    self.statistics.message_received(text.len());
                    manager.repeat_text(&text, Some(self.id)).await;
                }
                Message::Binary(data) => {
                    self.statistics.message_received(data.len());
                    manager.enqueue_binary(convert(Some(data.as_slice()))?, Some(self.id))?;
                }
                Message::Ping(payload) => {
                    self.queue(Frame::pong(payload))?;
                }
                Message::Pong(_) => {}
                Message::Close(code, reason) => {
                    info!("websocket {} closed by {}, code: {:?} reason: {}", self.id, self.peer, code, reason);
                    self.queue(Frame::close(code))?;
                    return Ok(());
                }
            }
        }
    }
}

#[async_trait]
impl Endpoint for WebPageConnection {
    fn id(&self) -> EndpointId {
        self.id
    }

    async fn send_binary(&self, data: &[u8]) -> Result<()> {
        if !self.aoim.passes(data) {
            return Ok(());
        }
        if self.queue(Frame::binary(data))? {
            self.statistics.message_sent(data.len());
        }
        Ok(())
    }

    async fn send_text(&self, message: &str) -> Result<()> {
        if self.queue(Frame::text(message))? {
            self.statistics.message_sent(message.len());
        }
        Ok(())
    }

    fn statistics(&self) -> &ConnectionStatistics {
        &self.statistics
    }
}

fn setup_writer_task(mut writer: OwnedWriteHalf, mut receiver: Receiver<Frame>) {
    tokio::spawn(async move {
        while let Some(frame) = receiver.recv().await {
            if let Err(e) = writer.write_all(&frame.encode()).await {
                debug!("websocket write failed: {}", e);
                break;
            }
            if frame.opcode == Opcode::Close {
                break;
            }
        }
        let _ = writer.shutdown().await;
    });
}

pub async fn handle_connection(stream: TcpStream,
                               peer: SocketAddr,
                               manager: Arc<ConnectionManager>,
                               aoim: AreaOfInterest) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let path = timeout(HANDSHAKE_TIMEOUT, websocket::accept(&mut reader, &mut writer))
        .await
        .map_err(|_| format!("websocket handshake with {} timed out", peer))??;
    let (outbound, receiver) = mpsc::channel(OUTBOUND_QUEUE_SIZE);
    setup_writer_task(writer, receiver);
    let connection = Arc::new(WebPageConnection::new(peer, outbound, aoim));
    info!("websocket {} opened from {} on {}", connection.id, peer, path);
    manager.add_connection(connection.clone());
    let mut reader = MessageReader::new(reader, MAX_MESSAGE_SIZE);
    let result = connection.read_loop(&mut reader, &manager).await;
    manager.remove_connection(connection.id);
    result
}

pub struct WebSocketServer {
    listener: TcpListener,
    manager: Arc<ConnectionManager>,
    aoim: AreaOfInterest,
}

impl WebSocketServer {
    pub async fn bind(config: &Config, manager: Arc<ConnectionManager>) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", config.web_port)).await?;
        Ok(WebSocketServer {
            listener,
            manager,
            aoim: AreaOfInterest::from(config.enable_aoim, &config.aoim_pdu_types),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let manager = self.manager.clone();
                    let aoim = self.aoim.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, manager, aoim).await {
                            warn!("websocket connection from {} ended: {}", peer, e);
                        }
                    });
                }
                Err(e) => {
                    error!("accept websocket connection failed: {:?}", e)
                }
            }
        }
    }
}
