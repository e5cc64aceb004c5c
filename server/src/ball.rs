//! Authority over a game's single ball.
//!
//! The server holds at most one ball per game. A stored ball is live; a game
//! without one is waiting for the next serve. Clients propose updates and the
//! server accepts or denies each against the stored ball:
//!
//! | stored | submitted                 | result                      |
//! |--------|---------------------------|-----------------------------|
//! | none   | no id                     | register, fresh id          |
//! | some   | no id                     | `AlreadyLive`               |
//! | some   | matching id, alive        | touch, if the count adds up |
//! | some   | matching id, not alive    | death, ball cleared         |
//! | any    | other id                  | `StaleBall`                 |

use crate::error::BallDenial;
use shared::{BallState, LIVE_STATE_ALIVE};
use uuid::Uuid;

/// An accepted ball update.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Register(BallState),
    Touch(BallState),
    Death(BallState),
}

impl Transition {
    /// Ball the game holds after this transition.
    pub fn next_state(&self) -> Option<BallState> {
        match self {
            Transition::Register(ball) | Transition::Touch(ball) => Some(ball.clone()),
            Transition::Death(_) => None,
        }
    }

    /// Snapshot relayed to the game's players.
    pub fn snapshot(&self) -> &BallState {
        match self {
            Transition::Register(ball) | Transition::Touch(ball) | Transition::Death(ball) => ball,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transition::Register(_) => "register",
            Transition::Touch(_) => "touch",
            Transition::Death(_) => "death",
        }
    }
}

/// A touch is valid when it is the first of a rally (count 0 or 1) or exactly
/// one more than the server's count.
pub fn touch_count_valid(submitted: i32, stored: i32) -> bool {
    submitted <= 1 || stored.checked_add(1) == Some(submitted)
}

pub fn evaluate(current: Option<&BallState>, mut submitted: BallState) -> Result<Transition, BallDenial> {
    if !submitted.has_id() {
        if current.is_some() {
            return Err(BallDenial::AlreadyLive);
        }
        submitted.guid = Uuid::new_v4().to_string();
        if !submitted.is_alive() {
            submitted.live_state = LIVE_STATE_ALIVE.to_string();
        }
        return Ok(Transition::Register(submitted));
    }

    let stored = match current {
        Some(stored) if stored.guid == submitted.guid => stored,
        _ => return Err(BallDenial::StaleBall),
    };

    if !submitted.is_alive() {
        return Ok(Transition::Death(submitted));
    }

    if !touch_count_valid(submitted.touch_count, stored.touch_count) {
        return Err(BallDenial::TouchCountMismatch {
            client: submitted.touch_count,
            server: stored.touch_count,
        });
    }
    Ok(Transition::Touch(submitted))
}
