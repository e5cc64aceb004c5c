//! Wire envelope, message tags and payloads.
//!
//! Every frame is a JSON envelope `{"Type": <tag>, "Data": <payload as a JSON string>}`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{BallState, PlayerAction, PlayerAttributes};

/// Closed set of message tags understood on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageTag {
    Ping,
    CreateGame,
    CreateLobby,
    CheckLobby,
    Admission,
    AddPlayerGame,
    AddPlayerLobby,
    LeaveLobby,
    LeaveGame,
    SetBackdrop,
    SwitchSide,
    PlayerAction,
    BallState,
    StartGame,
    PlayerInclude,
    SyncHost,
    ForcePlayer,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagError {
    Unknown(String),
    Ambiguous(String, Vec<MessageTag>),
}

impl std::fmt::Display for TagError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TagError::Unknown(tag) => write!(f, "unrecognized message tag '{tag}'"),
            TagError::Ambiguous(tag, matches) => {
                let names: Vec<&str> = matches.iter().map(|m| m.as_str()).collect();
                write!(f, "message tag '{tag}' matches several tags: {}", names.join(", "))
            }
        }
    }
}

impl std::error::Error for TagError {}

impl MessageTag {
    pub const ALL: [MessageTag; 18] = [
        MessageTag::Ping,
        MessageTag::CreateGame,
        MessageTag::CreateLobby,
        MessageTag::CheckLobby,
        MessageTag::Admission,
        MessageTag::AddPlayerGame,
        MessageTag::AddPlayerLobby,
        MessageTag::LeaveLobby,
        MessageTag::LeaveGame,
        MessageTag::SetBackdrop,
        MessageTag::SwitchSide,
        MessageTag::PlayerAction,
        MessageTag::BallState,
        MessageTag::StartGame,
        MessageTag::PlayerInclude,
        MessageTag::SyncHost,
        MessageTag::ForcePlayer,
        MessageTag::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MessageTag::Ping => "ping",
            MessageTag::CreateGame => "creategame",
            MessageTag::CreateLobby => "createlobby",
            MessageTag::CheckLobby => "checklobby",
            MessageTag::Admission => "admission",
            MessageTag::AddPlayerGame => "addplayergame",
            MessageTag::AddPlayerLobby => "addplayerlobby",
            MessageTag::LeaveLobby => "leavelobby",
            MessageTag::LeaveGame => "leavegame",
            MessageTag::SetBackdrop => "setbackdrop",
            MessageTag::SwitchSide => "switchside",
            MessageTag::PlayerAction => "playeraction",
            MessageTag::BallState => "ballstate",
            MessageTag::StartGame => "startgame",
            MessageTag::PlayerInclude => "playerinclude",
            MessageTag::SyncHost => "synchost",
            MessageTag::ForcePlayer => "forceplayer",
            MessageTag::Error => "error",
        }
    }

    /// Tags a client is allowed to send.
    pub fn is_inbound(self) -> bool {
        !matches!(
            self,
            MessageTag::PlayerInclude
                | MessageTag::SyncHost
                | MessageTag::ForcePlayer
                | MessageTag::Error
        )
    }

    /// Exact lookup, ignoring case and `-`/`_`/space separators.
    pub fn parse_exact(raw: &str) -> Result<Self, TagError> {
        let normalized = normalize(raw);
        Self::ALL
            .into_iter()
            .find(|tag| tag.as_str() == normalized)
            .ok_or_else(|| TagError::Unknown(raw.to_string()))
    }

    /// Legacy containment lookup: the raw tag may carry extra text around a known
    /// tag. More than one contained tag is rejected rather than resolved by order.
    pub fn parse_substring(raw: &str) -> Result<Self, TagError> {
        let normalized = normalize(raw);
        let matches: Vec<MessageTag> = Self::ALL
            .into_iter()
            .filter(|tag| normalized.contains(tag.as_str()))
            .collect();

        match matches.as_slice() {
            [] => Err(TagError::Unknown(raw.to_string())),
            [only] => Ok(*only),
            _ => Err(TagError::Ambiguous(raw.to_string(), matches)),
        }
    }
}

impl std::fmt::Display for MessageTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|ch| !matches!(ch, '-' | '_' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}

/// A payload type bound to the tag it travels under.
pub trait Payload: Serialize + DeserializeOwned {
    const TAG: MessageTag;
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Envelope {
    #[serde(rename = "Type", alias = "type")]
    pub kind: String,
    #[serde(rename = "Data", alias = "data", default)]
    pub data: String,
}

impl Envelope {
    pub fn wrap<P: Payload>(payload: &P) -> serde_json::Result<Self> {
        Ok(Self {
            kind: P::TAG.as_str().to_string(),
            data: serde_json::to_string(payload)?,
        })
    }

    /// Decodes the payload. A missing or blank `Data` decodes as an empty object so
    /// bodiless requests like `{"Type":"creategame"}` are accepted.
    pub fn open<P: Payload>(&self) -> serde_json::Result<P> {
        if self.data.trim().is_empty() {
            serde_json::from_str("{}")
        } else {
            serde_json::from_str(&self.data)
        }
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

macro_rules! payload {
    ($ty:ty => $tag:expr) => {
        impl Payload for $ty {
            const TAG: MessageTag = $tag;
        }
    };
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct PingMessage {
    pub ping_time: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct CreateGameMessage {
    #[serde(rename = "GameID")]
    pub game_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct CreateLobbyMessage {
    pub err_msg: String,
    pub room_code: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct CheckLobbyMessage {
    pub exists: bool,
    pub room_code: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct AdmissionMessage {
    #[serde(rename = "ClientPlayerID")]
    pub client_player_id: i64,
    #[serde(rename = "ServerPlayerID")]
    pub server_player_id: String,
    pub attributes: PlayerAttributes,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct AddPlayerGameMessage {
    pub err_msg: String,
    #[serde(rename = "ServerPlayerID")]
    pub server_player_id: String,
    #[serde(rename = "GameID")]
    pub game_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct AddPlayerLobbyMessage {
    pub err_msg: String,
    #[serde(rename = "ServerPlayerID")]
    pub server_player_id: String,
    pub room_code: String,
}

/// Sent by a client leaving a game, and relayed to the game as the "left" notice.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct LeaveGameMessage {
    #[serde(rename = "GameID")]
    pub game_id: String,
    #[serde(rename = "PlayerServerID")]
    pub player_server_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct LeaveLobbyMessage {
    #[serde(rename = "RoomCode")]
    pub room_code: String,
    #[serde(rename = "PlayerServerID")]
    pub player_server_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct SetBackdropMessage {
    pub room_code: String,
    pub resource_name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct SwitchSideMessage {
    #[serde(rename = "ServerPlayerID")]
    pub server_player_id: String,
    pub room_code: String,
}

/// A player's action inside either a game (`game_id`) or a lobby (`room_code`).
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct PlayerActionMessage {
    pub action: PlayerAction,
    #[serde(rename = "PlayerServerID")]
    pub player_server_id: String,
    #[serde(rename = "GameID")]
    pub game_id: String,
    pub room_code: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct BallStateMessage {
    pub ball: BallState,
    #[serde(rename = "GameID")]
    pub game_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct StartGameMessage {
    pub room_code: String,
    #[serde(rename = "GameID")]
    pub game_id: String,
}

/// Tells a client to spawn (or refresh) a peer.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct PlayerIncludeMessage {
    #[serde(rename = "ServerPlayerID")]
    pub server_player_id: String,
    pub attributes: PlayerAttributes,
    pub action: PlayerAction,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct SyncHostMessage {
    #[serde(rename = "HostID")]
    pub host_id: String,
}

/// Server-issued placement that overrides a client's local copy of a player.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct ForcePlayerMessage {
    pub action: PlayerAction,
    #[serde(rename = "ServerPlayerID")]
    pub server_player_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase", default)]
pub struct ErrorMessage {
    pub kind: String,
    pub message: String,
}

payload!(PingMessage => MessageTag::Ping);
payload!(CreateGameMessage => MessageTag::CreateGame);
payload!(CreateLobbyMessage => MessageTag::CreateLobby);
payload!(CheckLobbyMessage => MessageTag::CheckLobby);
payload!(AdmissionMessage => MessageTag::Admission);
payload!(AddPlayerGameMessage => MessageTag::AddPlayerGame);
payload!(AddPlayerLobbyMessage => MessageTag::AddPlayerLobby);
payload!(LeaveGameMessage => MessageTag::LeaveGame);
payload!(LeaveLobbyMessage => MessageTag::LeaveLobby);
payload!(SetBackdropMessage => MessageTag::SetBackdrop);
payload!(SwitchSideMessage => MessageTag::SwitchSide);
payload!(PlayerActionMessage => MessageTag::PlayerAction);
payload!(BallStateMessage => MessageTag::BallState);
payload!(StartGameMessage => MessageTag::StartGame);
payload!(PlayerIncludeMessage => MessageTag::PlayerInclude);
payload!(SyncHostMessage => MessageTag::SyncHost);
payload!(ForcePlayerMessage => MessageTag::ForcePlayer);
payload!(ErrorMessage => MessageTag::Error);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_tag_ignores_case_and_separators() {
        assert_eq!(MessageTag::parse_exact("ping"), Ok(MessageTag::Ping));
        assert_eq!(MessageTag::parse_exact("CreateGame"), Ok(MessageTag::CreateGame));
        assert_eq!(MessageTag::parse_exact("create-lobby"), Ok(MessageTag::CreateLobby));
        assert_eq!(MessageTag::parse_exact("BALL_STATE"), Ok(MessageTag::BallState));
        assert!(matches!(
            MessageTag::parse_exact("ballstatemessage"),
            Err(TagError::Unknown(_))
        ));
    }

    #[test]
    fn test_every_tag_parses_back_to_itself() {
        for tag in MessageTag::ALL {
            assert_eq!(MessageTag::parse_exact(tag.as_str()), Ok(tag));
            assert_eq!(MessageTag::parse_substring(tag.as_str()), Ok(tag));
        }
    }

    #[test]
    fn test_substring_tag_accepts_legacy_decorations() {
        assert_eq!(
            MessageTag::parse_substring("BallStateMessage"),
            Ok(MessageTag::BallState)
        );
        assert_eq!(
            MessageTag::parse_substring("PingRequest"),
            Ok(MessageTag::Ping)
        );
    }

    // Containment matching cannot tell which tag a concatenated name meant; the old
    // dispatcher silently took whichever it checked first.
    #[test]
    fn test_substring_tag_rejects_ambiguous_names() {
        match MessageTag::parse_substring("ping-creategame") {
            Err(TagError::Ambiguous(_, matches)) => {
                assert!(matches.contains(&MessageTag::Ping));
                assert!(matches.contains(&MessageTag::CreateGame));
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
        assert!(MessageTag::parse_exact("ping-creategame").is_err());
    }

    #[test]
    fn test_server_only_tags_are_not_inbound() {
        assert!(!MessageTag::SyncHost.is_inbound());
        assert!(!MessageTag::PlayerInclude.is_inbound());
        assert!(!MessageTag::ForcePlayer.is_inbound());
        assert!(!MessageTag::Error.is_inbound());
        assert!(MessageTag::BallState.is_inbound());
        assert!(MessageTag::StartGame.is_inbound());
    }

    #[test]
    fn test_envelope_wraps_payload_as_string() {
        let envelope = Envelope::wrap(&CreateGameMessage {
            game_id: "g-1".to_string(),
        })
        .unwrap();
        assert_eq!(envelope.kind, "creategame");

        let json = envelope.to_json().unwrap();
        assert_eq!(json, r#"{"Type":"creategame","Data":"{\"GameID\":\"g-1\"}"}"#);
    }

    #[test]
    fn test_envelope_without_data_opens_as_defaults() {
        let envelope = Envelope::from_json(r#"{"Type":"creategame"}"#).unwrap();
        let payload: CreateGameMessage = envelope.open().unwrap();
        assert_eq!(payload.game_id, "");
    }

    #[test]
    fn test_envelope_accepts_lowercase_keys() {
        let envelope = Envelope::from_json(r#"{"type":"ping","data":"{\"PingTime\":\"12\"}"}"#).unwrap();
        let ping: PingMessage = envelope.open().unwrap();
        assert_eq!(ping.ping_time, "12");
    }

    #[test]
    fn test_envelope_without_type_is_rejected() {
        assert!(Envelope::from_json(r#"{"Data":"{}"}"#).is_err());
        assert!(Envelope::from_json("not json").is_err());
    }

    #[test]
    fn test_ball_message_nests_ball() {
        let json = r#"{"GameID":"g","Ball":{"GUID":"","TouchCount":0,"LiveState":"alive"}}"#;
        let msg: BallStateMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.game_id, "g");
        assert!(!msg.ball.has_id());
        assert!(msg.ball.is_alive());
    }
}
