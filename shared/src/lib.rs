//! State types and constants shared by the server and its clients.
//!
//! Field names follow the JSON the clients already speak (`Pos`, `TouchCount`,
//! `GUID`, ...), so every struct renames its fields explicitly.

use serde::{Deserialize, Serialize};

pub mod protocol;

pub use protocol::{Envelope, MessageTag, Payload, TagError};

/// Symbols a room code is drawn from. No vowels, so codes never spell words.
pub const ROOM_CODE_ALPHABET: &str = "BCDFGHJKLMNPQRSTVWXZ";
pub const ROOM_CODE_LEN: usize = 4;

/// Spawn bounds on either side of the net (x = 0).
pub const MIN_COURT_SPAWN_X: f32 = 1.0;
pub const MAX_COURT_SPAWN_X: f32 = 10.0;

pub const ENTITY_TIMEOUT_SECS: u64 = 10 * 60;
pub const SWEEP_INTERVAL_SECS: u64 = 60;
pub const CONNECTION_IDLE_TIMEOUT_SECS: u64 = 2 * 60;
pub const MAX_ROOM_CODE_ATTEMPTS: usize = 10_000;

pub const LIVE_STATE_ALIVE: &str = "alive";
pub const LIVE_STATE_DEAD: &str = "dead";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq)]
pub struct Vector2 {
    #[serde(rename = "X")]
    pub x: f32,
    #[serde(rename = "Y")]
    pub y: f32,
}

impl Vector2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Transient per-frame state of a player, relayed as-is between clients.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct PlayerAction {
    pub pos: Vector2,
    pub vel: Vector2,
    pub face_right: bool,
    pub anim: String,
    pub axis_x: f32,
}

impl PlayerAction {
    /// Court side the player currently stands on; the net sits at x = 0.
    pub fn is_right_side(&self) -> bool {
        self.pos.x > 0.0
    }
}

/// Values fixed for the lifetime of a player's admission.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct PlayerAttributes {
    pub display_name: String,
    pub strength: f32,
    pub speed: f32,
    pub jump: f32,
    pub size: f32,
    pub tier: i32,
    pub cosmetics: Vec<String>,
}

/// Client-submitted snapshot of the match ball.
///
/// An empty `guid` means the client is asking the server to register a new ball.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct BallState {
    #[serde(rename = "GUID")]
    pub guid: String,
    pub pos: Vector2,
    pub vel: Vector2,
    pub gravity_scale: f32,
    pub touched_by: String,
    pub touch_count: i32,
    pub live_state: String,
    pub serve_state: String,
}

impl BallState {
    pub fn is_alive(&self) -> bool {
        self.live_state.to_lowercase().contains(LIVE_STATE_ALIVE)
    }

    pub fn has_id(&self) -> bool {
        !self.guid.is_empty()
    }
}

pub fn is_valid_room_code(code: &str) -> bool {
    code.len() == ROOM_CODE_LEN && code.chars().all(|ch| ROOM_CODE_ALPHABET.contains(ch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_alphabet_has_twenty_consonants() {
        assert_eq!(ROOM_CODE_ALPHABET.len(), 20);
        for vowel in ['A', 'E', 'I', 'O', 'U'] {
            assert!(!ROOM_CODE_ALPHABET.contains(vowel));
        }
    }

    #[test]
    fn test_room_code_validation() {
        assert!(is_valid_room_code("QBPX"));
        assert!(!is_valid_room_code("QBP"));
        assert!(!is_valid_room_code("QBPXZ"));
        assert!(!is_valid_room_code("QAPX"));
        assert!(!is_valid_room_code("qbpx"));
    }

    #[test]
    fn test_ball_liveness_is_case_insensitive() {
        let mut ball = BallState {
            live_state: "Alive".to_string(),
            ..Default::default()
        };
        assert!(ball.is_alive());

        ball.live_state = "BALL_ALIVE_SERVE".to_string();
        assert!(ball.is_alive());

        ball.live_state = LIVE_STATE_DEAD.to_string();
        assert!(!ball.is_alive());

        ball.live_state.clear();
        assert!(!ball.is_alive());
    }

    #[test]
    fn test_ball_field_names_match_clients() {
        let json = r#"{"GUID":"b-1","Pos":{"X":1.5,"Y":2.0},"TouchCount":3,"LiveState":"alive","TouchedBy":"p-9"}"#;
        let ball: BallState = serde_json::from_str(json).unwrap();

        assert_eq!(ball.guid, "b-1");
        assert_approx_eq!(ball.pos.x, 1.5);
        assert_eq!(ball.touch_count, 3);
        assert_eq!(ball.touched_by, "p-9");
        assert!(ball.has_id());
        assert!(ball.is_alive());
        assert_eq!(ball.serve_state, "");
    }

    #[test]
    fn test_player_action_side() {
        let mut action = PlayerAction::default();
        assert!(!action.is_right_side());

        action.pos.x = 0.01;
        assert!(action.is_right_side());

        action.pos.x = -4.0;
        assert!(!action.is_right_side());
    }

    #[test]
    fn test_player_action_partial_json() {
        let action: PlayerAction = serde_json::from_str(r#"{"AxisX":-1.0,"Anim":"jump"}"#).unwrap();
        assert_approx_eq!(action.axis_x, -1.0);
        assert_eq!(action.anim, "jump");
        assert_eq!(action.pos, Vector2::default());
        assert!(!action.face_right);
    }
}
