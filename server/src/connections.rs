//! Outbound channels of the connected sockets
//!
//! Each serving task registers an unbounded sender under its peer address. Handlers
//! never touch sockets directly; they push serialized frames here and the
//! connection's writer task drains them. This keeps all socket I/O outside of
//! registry and entity locks.

use log::{debug, info};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::Instant;

/// A registered connection's outbound half
#[derive(Debug)]
struct Connection {
    tx: UnboundedSender<String>,
    connected_at: Instant,
}

/// Routes outbound frames to connections by peer address
#[derive(Debug, Default)]
pub struct ConnectionManager {
    connections: RwLock<HashMap<SocketAddr, Connection>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `addr` and returns the receiving end its writer should drain
    ///
    /// A second registration under the same address replaces the first; the
    /// old receiver then sees its channel close.
    pub fn register(&self, addr: SocketAddr) -> UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        let previous = self.connections.write().insert(
            addr,
            Connection {
                tx,
                connected_at: Instant::now(),
            },
        );
        if previous.is_some() {
            info!("Connection from {} replaced an existing one", addr);
        } else {
            info!("Connection opened from {}", addr);
        }
        rx
    }

    /// Drops the connection's sender. Returns false if it was already gone.
    pub fn unregister(&self, addr: SocketAddr) -> bool {
        match self.connections.write().remove(&addr) {
            Some(conn) => {
                info!(
                    "Connection from {} closed after {}s",
                    addr,
                    conn.connected_at.elapsed().as_secs()
                );
                true
            }
            None => false,
        }
    }

    /// Queues `frame` for `addr`
    ///
    /// Returns false if no connection is registered there or its writer has
    /// already gone away.
    pub fn send(&self, addr: SocketAddr, frame: String) -> bool {
        let connections = self.connections.read();
        match connections.get(&addr) {
            Some(conn) => conn.tx.send(frame).is_ok(),
            None => {
                debug!("No connection registered for {}", addr);
                false
            }
        }
    }

    /// Returns the number of currently registered connections
    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }
}
