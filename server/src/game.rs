use crate::ball::{self, Transition};
use crate::config::BallCommit;
use crate::error::{BallDenial, EntityKind};
use crate::lifecycle::{Expirable, WatcherSlot};
use crate::roster::{Departure, Roster, Session};
use parking_lot::Mutex;
use shared::BallState;
use tokio::time::Instant;
use uuid::Uuid;

/// An in-match session: roster, host and the authoritative ball.
#[derive(Debug)]
pub struct Game {
    id: String,
    state: Mutex<GameFields>,
    watcher: WatcherSlot,
}

#[derive(Debug)]
struct GameFields {
    roster: Roster,
    ball: Option<BallState>,
    last_update: Instant,
}

impl Game {
    pub fn new() -> Self {
        Self::with_roster(Roster::new())
    }

    /// A game that starts with an existing player set and host, as promoted from a lobby.
    pub fn with_roster(roster: Roster) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            state: Mutex::new(GameFields {
                roster,
                ball: None,
                last_update: Instant::now(),
            }),
            watcher: WatcherSlot::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn ball(&self) -> Option<BallState> {
        self.state.lock().ball.clone()
    }

    pub fn player_count(&self) -> usize {
        self.state.lock().roster.len()
    }

    /// Validates a client's ball update and commits it when accepted.
    ///
    /// With [`BallCommit::Serialized`] validation and commit happen under one
    /// lock, so two registrations racing on an empty game cannot both win.
    /// [`BallCommit::LastWriterWins`] validates against a snapshot first.
    pub fn submit_ball(&self, submitted: BallState, commit: BallCommit) -> Result<Transition, BallDenial> {
        match commit {
            BallCommit::Serialized => {
                let mut state = self.state.lock();
                let transition = ball::evaluate(state.ball.as_ref(), submitted)?;
                state.ball = transition.next_state();
                state.last_update = Instant::now();
                Ok(transition)
            }
            BallCommit::LastWriterWins => {
                let snapshot = self.ball();
                let transition = ball::evaluate(snapshot.as_ref(), submitted)?;
                let mut state = self.state.lock();
                state.ball = transition.next_state();
                state.last_update = Instant::now();
                Ok(transition)
            }
        }
    }
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}

impl Expirable for Game {
    fn last_update(&self) -> Instant {
        self.state.lock().last_update
    }

    fn watcher(&self) -> &WatcherSlot {
        &self.watcher
    }
}

impl Session for Game {
    const KIND: EntityKind = EntityKind::Game;

    fn key(&self) -> &str {
        &self.id
    }

    fn join(&self, player_id: &str) -> bool {
        let mut state = self.state.lock();
        state.last_update = Instant::now();
        state.roster.join(player_id)
    }

    fn leave(&self, player_id: &str) -> Departure {
        let mut state = self.state.lock();
        state.last_update = Instant::now();
        state.roster.leave(player_id)
    }

    fn members(&self) -> Vec<String> {
        self.state.lock().roster.members()
    }

    fn host(&self) -> Option<String> {
        self.state.lock().roster.host().map(str::to_string)
    }

    fn touch(&self) {
        self.state.lock().last_update = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::time::Duration;

    fn fresh_ball() -> BallState {
        BallState {
            live_state: "alive".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_game_is_empty() {
        let game = Game::new();
        assert_eq!(game.id().len(), 36);
        assert!(game.ball().is_none());
        assert!(game.host().is_none());
        assert_eq!(game.player_count(), 0);
    }

    #[test]
    fn test_promoted_game_keeps_roster() {
        let mut roster = Roster::new();
        roster.join("host");
        roster.join("guest");

        let game = Game::with_roster(roster);
        assert_eq!(game.host().as_deref(), Some("host"));
        assert_eq!(game.player_count(), 2);
    }

    #[test]
    fn test_ball_lifecycle_through_game() {
        let game = Game::new();
        let registered = game.submit_ball(fresh_ball(), BallCommit::Serialized).unwrap();
        let live = game.ball().unwrap();
        assert_eq!(&live, registered.snapshot());

        let touch = BallState {
            touch_count: 1,
            ..live.clone()
        };
        game.submit_ball(touch, BallCommit::Serialized).unwrap();
        assert_eq!(game.ball().unwrap().touch_count, 1);

        let denied = BallState {
            touch_count: 3,
            ..live.clone()
        };
        assert!(game.submit_ball(denied, BallCommit::Serialized).is_err());
        assert_eq!(game.ball().unwrap().touch_count, 1);

        let dead = BallState {
            live_state: "dead".to_string(),
            ..live
        };
        game.submit_ball(dead, BallCommit::LastWriterWins).unwrap();
        assert!(game.ball().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_accepted_ball_refreshes_timestamp() {
        let game = Game::new();
        tokio::time::advance(Duration::from_secs(300)).await;
        assert!(game.is_expired(Duration::from_secs(200)));

        game.submit_ball(fresh_ball(), BallCommit::Serialized).unwrap();
        assert!(!game.is_expired(Duration::from_secs(200)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_ball_does_not_refresh_timestamp() {
        let game = Game::new();
        game.submit_ball(fresh_ball(), BallCommit::Serialized).unwrap();
        tokio::time::advance(Duration::from_secs(300)).await;

        assert!(game.submit_ball(fresh_ball(), BallCommit::Serialized).is_err());
        assert!(game.is_expired(Duration::from_secs(200)));
    }

    #[test]
    fn test_serialized_registration_accepted_once() {
        let game = Arc::new(Game::new());
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let game = Arc::clone(&game);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    game.submit_ball(fresh_ball(), BallCommit::Serialized).is_ok()
                })
            })
            .collect();

        let accepted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(accepted, 1);
    }
}
