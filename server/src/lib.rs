//! # Session Synchronization Server Library
//!
//! This library provides the authoritative backend for a real-time volleyball-style
//! multiplayer game. Clients simulate the match themselves; the server keeps the few
//! pieces of state that must agree everywhere and relays the rest.
//!
//! ## Core Responsibilities
//!
//! ### Session Lifecycle
//! Players are admitted, grouped into pre-match lobbies (addressed by short room
//! codes) and in-match games, and removed again on leave or disconnect. Idle games
//! and lobbies expire on their own.
//!
//! ### Ball Authority
//! Each game holds at most one ball. Clients propose ball updates; the server
//! accepts a registration, a touch whose count follows the server's, or a death,
//! and denies anything stale.
//!
//! ### Fan-out
//! Accepted changes are relayed to every connection in the affected game or
//! lobby, once per network address.
//!
//! ## Architecture Design
//!
//! ### Task per Connection
//! Each WebSocket connection is served by its own task. Tasks share state only
//! through the entity registries and small per-entity locks, so unrelated games
//! never contend.
//!
//! ### Synchronous Handlers
//! Message handlers never await. Outbound frames are queued on per-connection
//! channels and written by a separate task, which keeps socket I/O out of every
//! critical section.
//!
//! ## Module Organization
//!
//! ### Engine (`engine`, `dispatch`)
//! Owns the registries and implements every message handler, plus the single
//! idempotent player-removal routine used by leaves and disconnects.
//!
//! ### Entities (`player`, `game`, `lobby`, `roster`)
//! Entity records with their own locks; rosters track membership and the host.
//!
//! ### Rules (`ball`, `team`, `room_code`)
//! The ball state machine, court-side balancing and room code generation.
//!
//! ### Infrastructure (`registry`, `lifecycle`, `connections`, `network`)
//! Concurrent keyed stores, per-entity idle watchers, outbound channels and the
//! WebSocket transport.

pub mod ball;
pub mod config;
pub mod connections;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod game;
pub mod lifecycle;
pub mod lobby;
pub mod network;
pub mod player;
pub mod registry;
pub mod room_code;
pub mod roster;
pub mod stats;
pub mod team;
pub mod utils;

pub use config::{BallCommit, ServerConfig, TagMatching};
pub use engine::Engine;
pub use error::{BallDenial, EntityKind, ServerError};
