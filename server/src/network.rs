//! WebSocket transport: accepts connections and feeds their frames to the engine

use crate::engine::{encode, Engine};
use crate::error::ServerError;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

/// Why a connection's serving task ended
#[derive(Debug)]
pub enum Closed {
    ByPeer,
    ReadError(String),
    IdleTimeout,
    Fatal(ServerError),
}

impl std::fmt::Display for Closed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Closed::ByPeer => f.write_str("closed by peer"),
            Closed::ReadError(e) => write!(f, "read error: {}", e),
            Closed::IdleTimeout => f.write_str("idle timeout"),
            Closed::Fatal(e) => write!(f, "{}", e),
        }
    }
}

/// Listening server handing every connection its own serving task
pub struct Server {
    listener: TcpListener,
    engine: Arc<Engine>,
}

impl Server {
    pub async fn bind(engine: Arc<Engine>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(&engine.config().bind_addr).await?;
        info!("Server listening on {}", listener.local_addr()?);
        Ok(Server { listener, engine })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Spawns task that periodically logs server vitals
    fn spawn_stats_reporter(&self) {
        let period = self.engine.config().stats_interval;
        if period.is_zero() {
            return;
        }
        let engine = Arc::clone(&self.engine);

        tokio::spawn(async move {
            let mut interval = interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval.tick().await;

            loop {
                interval.tick().await;
                info!("{}", engine.stats_snapshot().summary());
            }
        });
    }

    /// Accept loop; runs until the listener fails irrecoverably
    pub async fn run(self) -> std::io::Result<()> {
        self.spawn_stats_reporter();
        info!("Server started successfully");

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let engine = Arc::clone(&self.engine);
                    tokio::spawn(async move {
                        serve_connection(engine, stream, addr).await;
                    });
                }
                Err(e) => warn!("Failed to accept connection: {}", e),
            }
        }
    }
}

/// Serves one client from handshake to cleanup
///
/// The peer's players are removed exactly once, whatever ended the connection.
pub async fn serve_connection(engine: Arc<Engine>, stream: TcpStream, addr: SocketAddr) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };

    let (mut sink, mut source) = ws.split();
    let mut outbound = engine.connections().register(addr);

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if let Err(e) = sink.send(Message::Text(frame)).await {
                debug!("Write to {} failed: {}", addr, e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    let reason = read_frames(&engine, &mut source, addr).await;
    match &reason {
        Closed::Fatal(e) => error!("Connection {} torn down: {}", addr, e),
        other => info!("Connection {} ended: {}", addr, other),
    }

    let removed = engine.disconnect(addr);
    if removed > 0 {
        info!("Removed {} player(s) of {}", removed, addr);
    }
    if let Err(e) = writer.await {
        debug!("Writer for {} ended abnormally: {}", addr, e);
    }
}

async fn read_frames(
    engine: &Engine,
    source: &mut futures_util::stream::SplitStream<WebSocketStream<TcpStream>>,
    addr: SocketAddr,
) -> Closed {
    let idle = engine.config().connection_idle_timeout;

    loop {
        let message = match timeout(idle, source.next()).await {
            Err(_) => return Closed::IdleTimeout,
            Ok(None) => return Closed::ByPeer,
            Ok(Some(Err(e))) => return Closed::ReadError(e.to_string()),
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Text(text) => {
                let outcome = catch_unwind(AssertUnwindSafe(|| engine.handle_frame(addr, &text)));
                match outcome {
                    Ok(Ok(Some(reply))) => engine.send_frame(addr, reply),
                    Ok(Ok(None)) => {}
                    Ok(Err(e)) => return Closed::Fatal(e),
                    Err(_) => return Closed::Fatal(ServerError::internal("message handler panicked")),
                }
            }
            Message::Binary(data) => {
                engine.stats().record_request(data.len());
                let err = ServerError::malformed("binary frames are not supported");
                match encode(&err.to_message()) {
                    Ok(frame) => engine.send_frame(addr, frame),
                    Err(e) => error!("{}", e),
                }
            }
            Message::Close(_) => return Closed::ByPeer,
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
    }
}
