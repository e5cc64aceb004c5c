use crate::error::EntityKind;
use crate::game::Game;
use crate::lifecycle::{Expirable, WatcherSlot};
use crate::roster::{Departure, Roster, Session};
use parking_lot::Mutex;
use tokio::time::Instant;

/// A pre-match session addressed by its room code.
#[derive(Debug)]
pub struct Lobby {
    room_code: String,
    state: Mutex<LobbyFields>,
    watcher: WatcherSlot,
}

#[derive(Debug)]
struct LobbyFields {
    roster: Roster,
    backdrop: String,
    last_update: Instant,
}

impl Lobby {
    pub fn new(room_code: impl Into<String>) -> Self {
        Self {
            room_code: room_code.into(),
            state: Mutex::new(LobbyFields {
                roster: Roster::new(),
                backdrop: String::new(),
                last_update: Instant::now(),
            }),
            watcher: WatcherSlot::default(),
        }
    }

    pub fn room_code(&self) -> &str {
        &self.room_code
    }

    pub fn backdrop(&self) -> String {
        self.state.lock().backdrop.clone()
    }

    pub fn set_backdrop(&self, resource_name: &str) {
        let mut state = self.state.lock();
        state.backdrop = resource_name.to_string();
        state.last_update = Instant::now();
    }

    pub fn player_count(&self) -> usize {
        self.state.lock().roster.len()
    }

    /// Builds a game carrying this lobby's current players and host.
    pub fn create_game(&self) -> Game {
        let mut state = self.state.lock();
        state.last_update = Instant::now();
        Game::with_roster(state.roster.clone())
    }
}

impl Expirable for Lobby {
    fn last_update(&self) -> Instant {
        self.state.lock().last_update
    }

    fn watcher(&self) -> &WatcherSlot {
        &self.watcher
    }
}

impl Session for Lobby {
    const KIND: EntityKind = EntityKind::Lobby;

    fn key(&self) -> &str {
        &self.room_code
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
