//! Session state engine
//!
//! Owns the three registries and implements every message handler. Handlers are
//! synchronous: they take short per-entity locks, queue outbound frames on the
//! connection channels and return the reply (if any) for the requester. Nothing
//! here awaits, so no lock is ever held across I/O.
//!
//! Player removal has exactly one implementation ([`Engine::depart`]) shared by
//! explicit leaves, disconnects, re-joins and lobby promotion, and it is
//! idempotent: removing a player that is already gone does nothing.

use crate::config::ServerConfig;
use crate::connections::ConnectionManager;
use crate::error::{EntityKind, Result, ServerError};
use crate::game::Game;
use crate::lifecycle::{self, Expirable, WatchPolicy};
use crate::lobby::Lobby;
use crate::player::Player;
use crate::registry::Registry;
use crate::roster::Session;
use crate::room_code;
use crate::stats::{ServerStats, StatsSnapshot};
use crate::team::{self, Side};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::protocol::*;
use shared::{Envelope, PlayerAction, PlayerAttributes, ROOM_CODE_LEN};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

/// Reply sent when no room code could be reserved.
pub const LOBBY_CAPACITY_MESSAGE: &str =
    "There are too many instances of player-hosted lobbies at the moment. Please try again later.";

pub struct Engine {
    config: ServerConfig,
    players: Arc<Registry<String, Player>>,
    games: Arc<Registry<String, Game>>,
    lobbies: Arc<Registry<String, Lobby>>,
    connections: ConnectionManager,
    rng: Mutex<StdRng>,
    stats: ServerStats,
}

/// Serializes an outbound payload into a text frame.
pub fn encode<P: Payload>(payload: &P) -> Result<String> {
    Envelope::wrap(payload)
        .and_then(|envelope| envelope.to_json())
        .map_err(|e| ServerError::internal(format!("failed to encode {}: {}", P::TAG, e)))
}

impl Engine {
    pub fn new(config: ServerConfig) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            config,
            players: Arc::new(Registry::new(EntityKind::Player)),
            games: Arc::new(Registry::new(EntityKind::Game)),
            lobbies: Arc::new(Registry::new(EntityKind::Lobby)),
            connections: ConnectionManager::new(),
            rng: Mutex::new(rng),
            stats: ServerStats::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn players(&self) -> &Registry<String, Player> {
        &self.players
    }

    pub fn games(&self) -> &Registry<String, Game> {
        &self.games
    }

    pub fn lobbies(&self) -> &Registry<String, Lobby> {
        &self.lobbies
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            started_at_ms: self.stats.started_at_ms(),
            requests: self.stats.requests(),
            bytes_received: self.stats.bytes_received(),
            bytes_sent: self.stats.bytes_sent(),
            lobbies: self.lobbies.len(),
            games: self.games.len(),
            players: self.players.len(),
            connections: self.connections.len(),
        }
    }

    fn watch_policy(&self) -> WatchPolicy {
        WatchPolicy {
            timeout: self.config.entity_timeout,
            interval: self.config.sweep_interval,
        }
    }

    // ---- outbound ----

    /// Queues a frame for one connection.
    pub fn send_frame(&self, addr: SocketAddr, frame: String) {
        let len = frame.len();
        if self.connections.send(addr, frame) {
            self.stats.record_sent(len);
        }
    }

    pub fn send_to<P: Payload>(&self, addr: SocketAddr, payload: &P) {
        match encode(payload) {
            Ok(frame) => self.send_frame(addr, frame),
            Err(e) => error!("{}", e),
        }
    }

    /// Sends `payload` to every player in `session`, once per network address.
    ///
    /// Returns the addresses the frame was queued for.
    pub fn broadcast<S, P>(&self, session: &S, payload: &P) -> HashSet<SocketAddr>
    where
        S: Session,
        P: Payload,
    {
        let mut recipients = HashSet::new();
        let frame = match encode(payload) {
            Ok(frame) => frame,
            Err(e) => {
                error!("{}", e);
                return recipients;
            }
        };

        for member in session.members() {
            match self.players.get(member.as_str()) {
                Some(player) => {
                    if recipients.insert(player.addr()) {
                        self.send_frame(player.addr(), frame.clone());
                    }
                }
                None => warn!(
                    "Skipping broadcast to unknown player {} in {} {}",
                    member,
                    S::KIND,
                    session.key()
                ),
            }
        }

        debug!(
            "Broadcast {} to {} connection(s) in {} {}",
            P::TAG,
            recipients.len(),
            S::KIND,
            session.key()
        );
        recipients
    }

    /// Sends the requester the `playerinclude` of every other member of `session`.
    fn send_includes<S: Session>(&self, addr: SocketAddr, session: &S, joiner_id: &str) {
        for member in session.members() {
            if member == joiner_id {
                continue;
            }
            match self.players.get(member.as_str()) {
                Some(peer) => self.send_to(addr, &peer.include_message()),
                None => warn!(
                    "Could not find player {} expected in {} {}",
                    member,
                    S::KIND,
                    session.key()
                ),
            }
        }
    }

    // ---- entity creation ----

    pub fn admit(&self, addr: SocketAddr, attributes: PlayerAttributes) -> Result<Arc<Player>> {
        let player = Player::new(addr, attributes);
        let id = player.id().to_string();
        let player = self
            .players
            .create_if_absent(id.clone(), player)
            .ok_or_else(|| ServerError::internal(format!("player id collision: {}", id)))?;
        info!("Admitted player {} from {}", id, addr);
        Ok(player)
    }

    pub fn create_game(&self) -> Result<Arc<Game>> {
        self.register_game(Game::new())
    }

    fn register_game(&self, game: Game) -> Result<Arc<Game>> {
        let id = game.id().to_string();
        let game = self
            .games
            .create_if_absent(id.clone(), game)
            .ok_or_else(|| ServerError::internal(format!("game id collision: {}", id)))?;

        let players = Arc::clone(&self.players);
        lifecycle::watch(
            Arc::clone(&self.games),
            id.clone(),
            &game,
            self.watch_policy(),
            move |game: Arc<Game>| {
                for member in game.members() {
                    if let Some(player) = players.get(member.as_str()) {
                        player.leave_game(game.id());
                    }
                }
            },
        );

        info!("Created game {}", id);
        Ok(game)
    }

    /// Reserves a fresh room code and registers a lobby under it.
    pub fn create_lobby(&self) -> Result<Arc<Lobby>> {
        let lobby = {
            let mut rng = self.rng.lock();
            room_code::reserve(&mut *rng, self.config.room_code_attempts, |code| {
                self.lobbies.create_if_absent(code.clone(), Lobby::new(code))
            })?
        };

        let players = Arc::clone(&self.players);
        lifecycle::watch(
            Arc::clone(&self.lobbies),
            lobby.room_code().to_string(),
            &lobby,
            self.watch_policy(),
            move |lobby: Arc<Lobby>| {
                for member in lobby.members() {
                    if let Some(player) = players.get(member.as_str()) {
                        player.leave_lobby(lobby.room_code());
                    }
                }
            },
        );

        info!("Registered lobby with room code {}", lobby.room_code());
        Ok(lobby)
    }

    // ---- removal ----

    /// Takes `player_id` out of `session`, notifying the remaining players.
    ///
    /// Deletes the session once it is empty, otherwise hands the host role on if
    /// the departing player held it. Returns false if the player was not a member.
    fn depart<S, P>(&self, registry: &Registry<String, S>, session: &Arc<S>, player_id: &str, notice: &P) -> bool
    where
        S: Session,
        P: Payload,
    {
        let departure = session.leave(player_id);
        if !departure.removed {
            return false;
        }
        info!("Player {} left {} {}", player_id, S::KIND, session.key());
        self.broadcast(session.as_ref(), notice);

        if departure.now_empty {
            // a concurrent join may have refilled the session since it emptied
            if registry.remove_if_same_and(session.key(), session, |s| s.members().is_empty()) {
                session.watcher().cancel();
                info!("Deleted empty {} {}", S::KIND, session.key());
            }
        } else if let Some(host_id) = departure.new_host {
            info!("{} {} host is now {}", S::KIND, session.key(), host_id);
            self.broadcast(session.as_ref(), &SyncHostMessage { host_id });
        }
        true
    }

    /// Joins `player_id` to `session` unless the session was deleted after it
    /// was looked up. Returns whether the player became host.
    fn enter<S: Session>(&self, registry: &Registry<String, S>, session: &Arc<S>, player_id: &str) -> Result<bool> {
        let became_host = session.join(player_id);
        match registry.get(session.key()) {
            Some(current) if Arc::ptr_eq(&current, session) => Ok(became_host),
            _ => {
                session.leave(player_id);
                Err(ServerError::not_found(S::KIND, session.key()))
            }
        }
    }

    fn leave_game_session(&self, player_id: &str, game_id: &str) -> bool {
        let removed = match self.games.get(game_id) {
            Some(game) => {
                let notice = LeaveGameMessage {
                    game_id: game_id.to_string(),
                    player_server_id: player_id.to_string(),
                };
                self.depart(&self.games, &game, player_id, &notice)
            }
            None => false,
        };
        if let Some(player) = self.players.get(player_id) {
            player.leave_game(game_id);
        }
        removed
    }

    fn leave_lobby_session(&self, player_id: &str, room_code: &str) -> bool {
        let removed = match self.lobbies.get(room_code) {
            Some(lobby) => {
                let notice = LeaveLobbyMessage {
                    room_code: room_code.to_string(),
                    player_server_id: player_id.to_string(),
                };
                self.depart(&self.lobbies, &lobby, player_id, &notice)
            }
            None => false,
        };
        if let Some(player) = self.players.get(player_id) {
            player.leave_lobby(room_code);
        }
        removed
    }

    /// Drops a player that no longer belongs to any game or lobby.
    fn retire_if_unaffiliated(&self, player_id: &str) {
        if let Some(player) = self.players.get(player_id) {
            if player.game_id().is_none()
                && player.room_code().is_none()
                && self.players.remove_if_same(player_id, &player)
            {
                info!("Removed player {}", player_id);
            }
        }
    }

    /// Removes a player from a game; the player itself is deleted unless it is
    /// still in a lobby. Safe to call more than once.
    pub fn remove_player_from_game(&self, player_id: &str, game_id: &str) -> bool {
        let removed = self.leave_game_session(player_id, game_id);
        self.retire_if_unaffiliated(player_id);
        removed
    }

    pub fn remove_player_from_lobby(&self, player_id: &str, room_code: &str) -> bool {
        let removed = self.leave_lobby_session(player_id, room_code);
        self.retire_if_unaffiliated(player_id);
        removed
    }

    /// Cleans up after a closed connection: every player admitted from `addr`
    /// leaves its game and lobby and is deleted. Returns how many players went.
    pub fn disconnect(&self, addr: SocketAddr) -> usize {
        self.connections.unregister(addr);

        let departing: Vec<Arc<Player>> = self
            .players
            .snapshot()
            .into_iter()
            .filter(|(_, player)| player.addr() == addr)
            .map(|(_, player)| player)
            .collect();

        for player in &departing {
            if let Some(game_id) = player.game_id() {
                self.leave_game_session(player.id(), &game_id);
            }
            if let Some(room_code) = player.room_code() {
                self.leave_lobby_session(player.id(), &room_code);
            }
            if self.players.remove_if_same(player.id(), player) {
                info!("Removed player {} after disconnect of {}", player.id(), addr);
            }
        }
        departing.len()
    }

    // ---- handlers ----

    pub fn handle_ping(&self, msg: PingMessage) -> Result<Option<PingMessage>> {
        Ok(Some(msg))
    }

    pub fn handle_create_game(&self) -> Result<Option<CreateGameMessage>> {
        let game = self.create_game()?;
        Ok(Some(CreateGameMessage {
            game_id: game.id().to_string(),
        }))
    }

    pub fn handle_create_lobby(&self) -> Result<Option<CreateLobbyMessage>> {
        match self.create_lobby() {
            Ok(lobby) => Ok(Some(CreateLobbyMessage {
                err_msg: String::new(),
                room_code: lobby.room_code().to_string(),
            })),
            Err(e @ ServerError::Capacity { .. }) => {
                warn!("{}", e);
                Ok(Some(CreateLobbyMessage {
                    err_msg: LOBBY_CAPACITY_MESSAGE.to_string(),
                    room_code: String::new(),
                }))
            }
            Err(e) => Err(e),
        }
    }

    pub fn handle_check_lobby(&self, msg: CheckLobbyMessage) -> Result<Option<CheckLobbyMessage>> {
        let exists = msg.room_code.len() == ROOM_CODE_LEN && self.lobbies.contains(msg.room_code.as_str());
        Ok(Some(CheckLobbyMessage {
            exists,
            room_code: msg.room_code,
        }))
    }

    pub fn handle_admission(&self, addr: SocketAddr, msg: AdmissionMessage) -> Result<Option<AdmissionMessage>> {
        let player = self.admit(addr, msg.attributes)?;
        Ok(Some(AdmissionMessage {
            client_player_id: msg.client_player_id,
            server_player_id: player.id().to_string(),
            attributes: player.attributes(),
        }))
    }

    pub fn handle_add_player_game(&self, addr: SocketAddr, msg: AddPlayerGameMessage) -> Result<Option<AddPlayerGameMessage>> {
        let player = self.players.lookup(msg.server_player_id.as_str())?;
        let game = self.games.lookup(msg.game_id.as_str())?;

        if let Some(previous) = player.join_game(game.id()) {
            if previous != game.id() {
                self.leave_game_session(player.id(), &previous);
            }
        }
        let became_host = match self.enter(&self.games, &game, player.id()) {
            Ok(became_host) => became_host,
            Err(e) => {
                player.leave_game(game.id());
                return Err(e);
            }
        };

        self.send_includes(addr, game.as_ref(), player.id());
        self.broadcast(game.as_ref(), &player.include_message());
        if became_host {
            info!("Player {} is host of game {}", player.id(), game.id());
            self.broadcast(
                game.as_ref(),
                &SyncHostMessage {
                    host_id: player.id().to_string(),
                },
            );
        }

        Ok(Some(AddPlayerGameMessage {
            err_msg: String::new(),
            server_player_id: player.id().to_string(),
            game_id: game.id().to_string(),
        }))
    }

    pub fn handle_add_player_lobby(&self, addr: SocketAddr, msg: AddPlayerLobbyMessage) -> Result<Option<AddPlayerLobbyMessage>> {
        let player = self.players.lookup(msg.server_player_id.as_str())?;
        let lobby = self.lobbies.lookup(msg.room_code.as_str())?;

        if let Some(previous) = player.join_lobby(lobby.room_code()) {
            if previous != lobby.room_code() {
                self.leave_lobby_session(player.id(), &previous);
            }
        }

        let others: Vec<PlayerAction> = lobby
            .members()
            .into_iter()
            .filter(|member| member != player.id())
            .filter_map(|member| self.players.get(member.as_str()))
            .map(|peer| peer.action())
            .collect();
        let (left, right) = team::count_sides(&others);
        let side = team::choose_side(left, right);
        let placement = {
            let mut rng = self.rng.lock();
            team::spawn_action(&mut *rng, side, self.config.spawn_min_x, self.config.spawn_max_x)
        };
        player.set_action(placement.clone());
        debug!(
            "Placed player {} on the {:?} side ({} left, {} right)",
            player.id(),
            side,
            left,
            right
        );

        let became_host = match self.enter(&self.lobbies, &lobby, player.id()) {
            Ok(became_host) => became_host,
            Err(e) => {
                player.leave_lobby(lobby.room_code());
                return Err(e);
            }
        };

        self.send_includes(addr, lobby.as_ref(), player.id());
        self.send_to(
            addr,
            &SetBackdropMessage {
                room_code: lobby.room_code().to_string(),
                resource_name: lobby.backdrop(),
            },
        );
        self.broadcast(lobby.as_ref(), &player.include_message());
        self.broadcast(
            lobby.as_ref(),
            &ForcePlayerMessage {
                action: placement,
                server_player_id: player.id().to_string(),
            },
        );
        if became_host {
            info!("Player {} is host of lobby {}", player.id(), lobby.room_code());
            self.broadcast(
                lobby.as_ref(),
                &SyncHostMessage {
                    host_id: player.id().to_string(),
                },
            );
        }

        Ok(Some(AddPlayerLobbyMessage {
            err_msg: String::new(),
            server_player_id: player.id().to_string(),
            room_code: lobby.room_code().to_string(),
        }))
    }

    pub fn handle_leave_game(&self, msg: LeaveGameMessage) -> Result<Option<LeaveGameMessage>> {
        if msg.player_server_id.is_empty() {
            return Err(ServerError::malformed("leavegame without PlayerServerID"));
        }
        self.games.lookup(msg.game_id.as_str())?;
        self.remove_player_from_game(&msg.player_server_id, &msg.game_id);
        Ok(None)
    }

    pub fn handle_leave_lobby(&self, msg: LeaveLobbyMessage) -> Result<Option<LeaveLobbyMessage>> {
        if msg.player_server_id.is_empty() {
            return Err(ServerError::malformed("leavelobby without PlayerServerID"));
        }
        self.lobbies.lookup(msg.room_code.as_str())?;
        self.remove_player_from_lobby(&msg.player_server_id, &msg.room_code);
        Ok(None)
    }

    pub fn handle_set_backdrop(&self, msg: SetBackdropMessage) -> Result<Option<SetBackdropMessage>> {
        let lobby = self.lobbies.lookup(msg.room_code.as_str())?;
        lobby.set_backdrop(&msg.resource_name);
        debug!("Lobby {} backdrop set to {}", lobby.room_code(), msg.resource_name);
        self.broadcast(lobby.as_ref(), &msg);
        Ok(None)
    }

    pub fn handle_switch_side(&self, msg: SwitchSideMessage) -> Result<Option<SwitchSideMessage>> {
        let player = self.players.lookup(msg.server_player_id.as_str())?;
        let lobby = self.lobbies.lookup(msg.room_code.as_str())?;

        let side = Side::of(&player.action()).opposite();
        let placement = {
            let mut rng = self.rng.lock();
            team::spawn_action(&mut *rng, side, self.config.spawn_min_x, self.config.spawn_max_x)
        };
        player.set_action(placement.clone());
        lobby.touch();

        self.broadcast(
            lobby.as_ref(),
            &ForcePlayerMessage {
                action: placement,
                server_player_id: player.id().to_string(),
            },
        );
        Ok(Some(msg))
    }

    pub fn handle_player_action(&self, msg: PlayerActionMessage) -> Result<Option<PlayerActionMessage>> {
        if !msg.player_server_id.is_empty() {
            let player = self.players.lookup(msg.player_server_id.as_str())?;
            player.set_action(msg.action.clone());
        }

        if !msg.game_id.is_empty() {
            let game = self.games.lookup(msg.game_id.as_str())?;
            game.touch();
            self.broadcast(game.as_ref(), &msg);
        } else if !msg.room_code.is_empty() {
            let lobby = self.lobbies.lookup(msg.room_code.as_str())?;
            lobby.touch();
            self.broadcast(lobby.as_ref(), &msg);
        } else {
            return Err(ServerError::malformed("playeraction names neither a game nor a lobby"));
        }
        Ok(None)
    }

    pub fn handle_ball_state(&self, addr: SocketAddr, msg: BallStateMessage) -> Result<Option<BallStateMessage>> {
        let game = self.games.lookup(msg.game_id.as_str())?;
        let touched_by = msg.ball.touched_by.clone();

        let transition = match game.submit_ball(msg.ball, self.config.ball_commit) {
            Ok(transition) => transition,
            Err(denial) => {
                warn!(
                    "Ball update denied in game {} from {} (touched by '{}'): {}",
                    game.id(),
                    addr,
                    touched_by,
                    denial
                );
                return Err(denial.into());
            }
        };
        info!(
            "Ball {} accepted in game {}: {} (touch count {})",
            transition.snapshot().guid,
            game.id(),
            transition.name(),
            transition.snapshot().touch_count
        );

        let update = BallStateMessage {
            ball: transition.snapshot().clone(),
            game_id: game.id().to_string(),
        };
        let recipients = self.broadcast(game.as_ref(), &update);

        // a requester outside the game still needs to learn the ball id
        if recipients.contains(&addr) {
            Ok(None)
        } else {
            Ok(Some(update))
        }
    }

    /// Promotes a lobby to a game carrying the same players and host.
    pub fn handle_start_game(&self, addr: SocketAddr, msg: StartGameMessage) -> Result<Option<StartGameMessage>> {
        let lobby = self.lobbies.lookup(msg.room_code.as_str())?;
        let game = self.register_game(lobby.create_game())?;

        for member in game.members() {
            match self.players.get(member.as_str()) {
                Some(player) => {
                    if let Some(previous) = player.join_game(game.id()) {
                        if previous != game.id() {
                            self.leave_game_session(&member, &previous);
                        }
                    }
                }
                None => warn!("Promoted game {} includes unknown player {}", game.id(), member),
            }
        }
        info!("Lobby {} started game {}", lobby.room_code(), game.id());

        let started = StartGameMessage {
            room_code: lobby.room_code().to_string(),
            game_id: game.id().to_string(),
        };
        let recipients = self.broadcast(lobby.as_ref(), &started);
        if recipients.contains(&addr) {
            Ok(None)
        } else {
            Ok(Some(started))
        }
    }
}
