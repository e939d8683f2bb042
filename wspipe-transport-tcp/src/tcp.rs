//! TCP transport implementation for wspipe
//!
//! A [`Connection`] owns one socket and the [`Pipeline`] of that connection.
//! It feeds socket bytes into the head of the chain, writes whatever reaches
//! the head back to the socket, delivers stage timers and shuts the socket
//! down once the chain asks for it.

use bytes::BytesMut;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use wspipe_core::error::{Error, PipelineError, Result};
use wspipe_core::event::PipelineEvent;
use wspipe_core::message::Message;
use wspipe_core::pipeline::{ConnectionId, Outbound, Pipeline};
use wspipe_core::promise::WriteFuture;
use wspipe_core::timer::TimerFired;
use wspipe_core::{log_debug, log_info, log_trace, log_warn};

const READ_BUFFER_SIZE: usize = 8 * 1024;

/// What reached the tail end of a connection's chain
#[derive(Debug)]
pub enum Delivery {
    /// Inbound message no stage consumed
    Message(Message),
    /// Event no stage consumed
    Event(PipelineEvent),
}

enum Command {
    Write {
        message: Message,
        reply: oneshot::Sender<Result<WriteFuture>>,
    },
    Close,
}

enum Step {
    Read(std::io::Result<usize>),
    Command(Option<Command>),
    Timer(TimerFired),
}

/// Handle for writing to and closing a running [`Connection`]
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    connection_id: ConnectionId,
    commands: mpsc::UnboundedSender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Write { message, .. } => write!(f, "Write({})", message.kind()),
            Command::Close => write!(f, "Close"),
        }
    }
}

impl ConnectionHandle {
    /// Connection this handle drives
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Write `message` from the tail end of the chain and wait until it
    /// reached the socket
    pub async fn write(&self, message: impl Into<Message>) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Write {
                message: message.into(),
                reply,
            })
            .map_err(|_| gone())?;
        let written = rx.await.map_err(|_| gone())??;
        written.await
    }

    /// Close the connection from the tail end of the chain
    pub fn close(&self) -> Result<()> {
        self.commands.send(Command::Close).map_err(|_| gone())
    }

    /// Whether the connection task has finished
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

fn gone() -> Error {
    Error::Connection("connection task has finished".to_string())
}

/// One socket driving one pipeline
#[derive(Debug)]
pub struct Connection {
    stream: TcpStream,
    pipeline: Pipeline,
    commands: mpsc::UnboundedReceiver<Command>,
    deliveries: Option<mpsc::UnboundedSender<Delivery>>,
}

impl Connection {
    /// Drive `pipeline` over an accepted or connected socket
    pub fn new(stream: TcpStream, pipeline: Pipeline) -> (Self, ConnectionHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ConnectionHandle {
            connection_id: pipeline.connection_id(),
            commands: tx,
        };
        let connection = Self {
            stream,
            pipeline,
            commands: rx,
            deliveries: None,
        };
        (connection, handle)
    }

    /// Connect to `addr` and drive `pipeline` over the new socket
    pub async fn connect(addr: SocketAddr, pipeline: Pipeline) -> Result<(Self, ConnectionHandle)> {
        let stream = TcpStream::connect(addr).await.map_err(Error::Io)?;
        stream.set_nodelay(true).map_err(Error::Io)?;
        Ok(Self::new(stream, pipeline))
    }

    /// Receive what reaches the tail end of the chain.
    ///
    /// Without a subscriber those messages and events are dropped.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<Delivery> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.deliveries = Some(tx);
        rx
    }

    /// Run until the chain closes the connection or the peer goes away
    pub async fn run(self) -> Result<()> {
        let Connection {
            mut stream,
            mut pipeline,
            mut commands,
            deliveries,
        } = self;
        let connection_id = pipeline.connection_id();
        let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
        let mut commands_open = true;

        log_debug!("{} connection started", connection_id);
        report(connection_id, pipeline.fire_active());

        let result = loop {
            deliver(&mut pipeline, deliveries.as_ref());
            if let Err(error) = flush(&mut stream, &mut pipeline).await {
                break Err(error);
            }
            if pipeline.is_closed() {
                break Ok(());
            }

            buf.reserve(READ_BUFFER_SIZE);
            let step = tokio::select! {
                read = stream.read_buf(&mut buf) => Step::Read(read),
                command = commands.recv(), if commands_open => Step::Command(command),
                fired = pipeline.next_timer() => Step::Timer(fired),
            };

            match step {
                Step::Read(Ok(0)) => {
                    log_debug!("{} peer closed the socket", connection_id);
                    break Ok(());
                }
                Step::Read(Ok(n)) => {
                    log_trace!("{} read {} bytes", connection_id, n);
                    report(connection_id, pipeline.fire_read(buf.split().freeze()));
                }
                Step::Read(Err(error)) => break Err(Error::Io(error)),
                Step::Command(Some(Command::Write { message, reply })) => {
                    let _ = reply.send(pipeline.write_and_listen(message));
                }
                Step::Command(Some(Command::Close)) => {
                    report(connection_id, pipeline.close());
                }
                Step::Command(None) => commands_open = false,
                Step::Timer(fired) => report(connection_id, pipeline.fire_timer(fired)),
            }
        };

        if let Err(error) = stream.shutdown().await {
            log_trace!("{} socket shutdown failed: {}", connection_id, error);
        }
        report(connection_id, pipeline.fire_inactive());
        deliver(&mut pipeline, deliveries.as_ref());
        while let Some(Outbound { promise, .. }) = pipeline.take_outbound() {
            if let Some(promise) = promise {
                promise.fail(gone());
            }
        }
        log_debug!("{} connection finished", connection_id);
        result
    }
}

/// Stage errors end up here; the chain has already reacted to them
fn report(connection_id: ConnectionId, result: Result<()>) {
    if let Err(error) = result {
        log_debug!("{} pipeline error: {}", connection_id, error);
    }
}

fn deliver(pipeline: &mut Pipeline, deliveries: Option<&mpsc::UnboundedSender<Delivery>>) {
    while let Some(message) = pipeline.read_inbound() {
        if let Some(tx) = deliveries {
            let _ = tx.send(Delivery::Message(message));
        }
    }
    while let Some(event) = pipeline.read_event() {
        if let Some(tx) = deliveries {
            let _ = tx.send(Delivery::Event(event));
        }
    }
}

async fn flush(stream: &mut TcpStream, pipeline: &mut Pipeline) -> Result<()> {
    while let Some(Outbound { message, promise }) = pipeline.take_outbound() {
        let bytes = match message {
            Message::Bytes(bytes) => bytes,
            other => {
                let error = PipelineError::Unencoded(other.kind());
                log_warn!("{} {}", pipeline.connection_id(), error);
                if let Some(promise) = promise {
                    promise.fail(error.into());
                }
                continue;
            }
        };
        match stream.write_all(&bytes).await {
            Ok(()) => {
                if let Some(promise) = promise {
                    promise.succeed();
                }
            }
            Err(error) => {
                if let Some(promise) = promise {
                    promise.fail(Error::Connection(error.to_string()));
                }
                return Err(Error::Io(error));
            }
        }
    }
    stream.flush().await.map_err(Error::Io)
}

/// TCP listener handing each accepted socket to its own [`Connection`]
#[derive(Debug)]
pub struct TcpTransport {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpTransport {
    /// Create a new TCP transport bound to the given address
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(Error::Io)?;
        let local_addr = listener.local_addr().map_err(Error::Io)?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept one socket and pair it with `pipeline`
    pub async fn accept(&self, pipeline: Pipeline) -> Result<(Connection, ConnectionHandle)> {
        let (stream, peer) = self.listener.accept().await.map_err(Error::Io)?;
        stream.set_nodelay(true).map_err(Error::Io)?;
        log_info!("{} accepted from {}", pipeline.connection_id(), peer);
        Ok(Connection::new(stream, pipeline))
    }

    /// Accept sockets forever, running each on its own task with a pipeline
    /// built by `new_pipeline`
    pub async fn serve<F>(self, new_pipeline: F) -> Result<()>
    where
        F: Fn() -> Result<Pipeline>,
    {
        loop {
            let pipeline = match new_pipeline() {
                Ok(pipeline) => pipeline,
                Err(error) => {
                    log_warn!("failed to build pipeline: {}", error);
                    return Err(error);
                }
            };
            let (connection, _handle) = self.accept(pipeline).await?;
            tokio::spawn(async move {
                if let Err(error) = connection.run().await {
                    log_debug!("connection ended with error: {}", error);
                }
            });
        }
    }
}
