//! Server-side record of an admitted player.

use parking_lot::Mutex;
use shared::protocol::PlayerIncludeMessage;
use shared::{PlayerAction, PlayerAttributes};
use std::net::SocketAddr;
use uuid::Uuid;

/// An admitted player and its affiliations.
///
/// The network address is fixed at admission and is how broadcasts reach the
/// player; everything else sits behind one small lock.
#[derive(Debug)]
pub struct Player {
    id: String,
    addr: SocketAddr,
    state: Mutex<PlayerFields>,
}

#[derive(Debug)]
struct PlayerFields {
    action: PlayerAction,
    attributes: PlayerAttributes,
    game_id: Option<String>,
    room_code: Option<String>,
}

impl Player {
    pub fn new(addr: SocketAddr, attributes: PlayerAttributes) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            addr,
            state: Mutex::new(PlayerFields {
                action: PlayerAction::default(),
                attributes,
                game_id: None,
                room_code: None,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn action(&self) -> PlayerAction {
        self.state.lock().action.clone()
    }

    pub fn attributes(&self) -> PlayerAttributes {
        self.state.lock().attributes.clone()
    }

    pub fn set_action(&self, action: PlayerAction) {
        self.state.lock().action = action;
    }

    pub fn game_id(&self) -> Option<String> {
        self.state.lock().game_id.clone()
    }

    pub fn room_code(&self) -> Option<String> {
        self.state.lock().room_code.clone()
    }

    /// Points the player at `game_id`, returning the game it was previously in.
    pub fn join_game(&self, game_id: &str) -> Option<String> {
        self.state.lock().game_id.replace(game_id.to_string())
    }

    /// Points the player at `room_code`, returning the lobby it was previously in.
    pub fn join_lobby(&self, room_code: &str) -> Option<String> {
        self.state.lock().room_code.replace(room_code.to_string())
    }

    /// Clears the game affiliation if it still names `game_id`.
    pub fn leave_game(&self, game_id: &str) {
        let mut state = self.state.lock();
        if state.game_id.as_deref() == Some(game_id) {
            state.game_id = None;
        }
    }

    pub fn leave_lobby(&self, room_code: &str) {
        let mut state = self.state.lock();
        if state.room_code.as_deref() == Some(room_code) {
            state.room_code = None;
        }
    }

    pub fn include_message(&self) -> PlayerIncludeMessage {
        let state = self.state.lock();
        PlayerIncludeMessage {
            server_player_id: self.id.clone(),
            attributes: state.attributes.clone(),
            action: state.action.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Vector2;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    #[test]
    fn test_player_creation() {
        let attributes = PlayerAttributes {
            display_name: "spike".to_string(),
            tier: 2,
            ..Default::default()
        };
        let player = Player::new(test_addr(), attributes.clone());

        assert_eq!(player.addr(), test_addr());
        assert_eq!(player.attributes(), attributes);
        assert_eq!(player.action(), PlayerAction::default());
        assert!(player.game_id().is_none());
        assert!(player.room_code().is_none());
        assert_eq!(player.id().len(), 36);
    }

    #[test]
    fn test_player_ids_are_unique() {
        let a = Player::new(test_addr(), PlayerAttributes::default());
        let b = Player::new(test_addr(), PlayerAttributes::default());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_affiliation_replaces_and_clears() {
        let player = Player::new(test_addr(), PlayerAttributes::default());

        assert_eq!(player.join_game("g1"), None);
        assert_eq!(player.join_game("g2"), Some("g1".to_string()));

        player.leave_game("g1");
        assert_eq!(player.game_id().as_deref(), Some("g2"));
        player.leave_game("g2");
        assert!(player.game_id().is_none());

        player.join_lobby("QBPX");
        player.leave_lobby("QBPX");
        assert!(player.room_code().is_none());
    }

    #[test]
    fn test_include_message_reflects_latest_action() {
        let player = Player::new(test_addr(), PlayerAttributes::default());
        player.set_action(PlayerAction {
            pos: Vector2::new(-3.0, 0.0),
            face_right: true,
            ..Default::default()
        });

        let include = player.include_message();
        assert_eq!(include.server_player_id, player.id());
        assert_eq!(include.action.pos.x, -3.0);
        assert!(include.action.face_right);
    }
}
