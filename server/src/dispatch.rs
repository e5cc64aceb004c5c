//! Routes one inbound text frame to its handler.

use crate::config::TagMatching;
use crate::engine::{encode, Engine};
use crate::error::{Result, ServerError};
use log::{debug, warn};
use shared::{Envelope, MessageTag, Payload};
use std::net::SocketAddr;

fn reply<P: Payload>(reply: Option<P>) -> Result<Option<String>> {
    reply.as_ref().map(encode).transpose()
}

impl Engine {
    /// Resolves the tag of an inbound envelope under the configured matching mode.
    pub fn resolve_tag(&self, raw: &str) -> Result<MessageTag> {
        let tag = match self.config().tag_matching {
            TagMatching::Exact => MessageTag::parse_exact(raw)?,
            TagMatching::Substring => MessageTag::parse_substring(raw)?,
        };
        if !tag.is_inbound() {
            return Err(ServerError::malformed(format!("'{}' is not accepted from clients", tag)));
        }
        Ok(tag)
    }

    /// Decodes and routes one frame, returning the reply frame for the requester.
    pub fn route(&self, addr: SocketAddr, text: &str) -> Result<Option<String>> {
        let envelope = Envelope::from_json(text)?;
        let tag = self.resolve_tag(&envelope.kind)?;
        debug!("{} from {}", tag, addr);

        match tag {
            MessageTag::Ping => reply(self.handle_ping(envelope.open()?)?),
            MessageTag::CreateGame => reply(self.handle_create_game()?),
            MessageTag::CreateLobby => reply(self.handle_create_lobby()?),
            MessageTag::CheckLobby => reply(self.handle_check_lobby(envelope.open()?)?),
            MessageTag::Admission => reply(self.handle_admission(addr, envelope.open()?)?),
            MessageTag::AddPlayerGame => reply(self.handle_add_player_game(addr, envelope.open()?)?),
            MessageTag::AddPlayerLobby => reply(self.handle_add_player_lobby(addr, envelope.open()?)?),
            MessageTag::LeaveGame => reply(self.handle_leave_game(envelope.open()?)?),
            MessageTag::LeaveLobby => reply(self.handle_leave_lobby(envelope.open()?)?),
            MessageTag::SetBackdrop => reply(self.handle_set_backdrop(envelope.open()?)?),
            MessageTag::SwitchSide => reply(self.handle_switch_side(envelope.open()?)?),
            MessageTag::PlayerAction => reply(self.handle_player_action(envelope.open()?)?),
            MessageTag::BallState => reply(self.handle_ball_state(addr, envelope.open()?)?),
            MessageTag::StartGame => reply(self.handle_start_game(addr, envelope.open()?)?),
            MessageTag::PlayerInclude | MessageTag::SyncHost | MessageTag::ForcePlayer | MessageTag::Error => {
                Err(ServerError::malformed(format!("'{}' is not accepted from clients", tag)))
            }
        }
    }

    /// Handles one inbound frame from `addr`.
    ///
    /// Recoverable failures become an `error` frame for the requester. Only an
    /// error that must end the connection is returned as `Err`.
    pub fn handle_frame(&self, addr: SocketAddr, text: &str) -> Result<Option<String>> {
        self.stats().record_request(text.len());

        match self.route(addr, text) {
            Ok(reply) => Ok(reply),
            Err(e) if e.is_fatal_to_connection() => Err(e),
            Err(e) => {
                warn!("Request from {} failed: {}", addr, e);
                encode(&e.to_message()).map(Some)
            }
        }
    }
}
