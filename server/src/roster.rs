use crate::error::EntityKind;
use crate::lifecycle::Expirable;
use std::collections::HashSet;

/// A game or lobby: a keyed roster that players join and leave.
pub trait Session: Expirable {
    const KIND: EntityKind;

    /// Registry key: game id or room code.
    fn key(&self) -> &str;

    /// Adds a player and refreshes the session. Returns `true` if the player became host.
    fn join(&self, player_id: &str) -> bool;

    fn leave(&self, player_id: &str) -> Departure;

    fn members(&self) -> Vec<String>;

    fn host(&self) -> Option<String>;

    fn touch(&self);
}

/// Player set of a game or lobby together with its host.
///
/// The host is always a current member while the roster is non-empty.
#[derive(Debug, Default, Clone)]
pub struct Roster {
    members: HashSet<String>,
    host: Option<String>,
}

/// Outcome of removing a player from a roster.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Departure {
    pub removed: bool,
    pub now_empty: bool,
    /// Set when the departing player was host and someone else took over.
    pub new_host: Option<String>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `player_id`. Returns `true` when the player became host.
    pub fn join(&mut self, player_id: &str) -> bool {
        self.members.insert(player_id.to_string());
        if self.host.is_none() {
            self.host = Some(player_id.to_string());
            return true;
        }
        false
    }

    pub fn leave(&mut self, player_id: &str) -> Departure {
        if !self.members.remove(player_id) {
            return Departure {
                removed: false,
                now_empty: self.members.is_empty(),
                new_host: None,
            };
        }

        let mut new_host = None;
        if self.host.as_deref() == Some(player_id) {
            self.host = self.members.iter().next().cloned();
            new_host = self.host.clone();
        }

        Departure {
            removed: true,
            now_empty: self.members.is_empty(),
            new_host,
        }
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.members.contains(player_id)
    }

    pub fn members(&self) -> Vec<String> {
        self.members.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_joiner_becomes_host() {
        let mut roster = Roster::new();
        assert!(roster.join("a"));
        assert!(!roster.join("b"));
        assert_eq!(roster.host(), Some("a"));
        assert_eq!(roster.len(), 2);
    }

    #[test]
    fn test_rejoin_is_noop() {
        let mut roster = Roster::new();
        roster.join("a");
        assert!(!roster.join("a"));
        assert_eq!(roster.len(), 1);
    }

    #[test]
    fn test_host_leaving_migrates_host() {
        let mut roster = Roster::new();
        roster.join("a");
        roster.join("b");

        let departure = roster.leave("a");
        assert!(departure.removed);
        assert!(!departure.now_empty);
        assert_eq!(departure.new_host.as_deref(), Some("b"));
        assert_eq!(roster.host(), Some("b"));
    }

    #[test]
    fn test_non_host_leaving_keeps_host() {
        let mut roster = Roster::new();
        roster.join("a");
        roster.join("b");

        let departure = roster.leave("b");
        assert!(departure.removed);
        assert_eq!(departure.new_host, None);
        assert_eq!(roster.host(), Some("a"));
    }

    #[test]
    fn test_last_leaver_empties_roster() {
        let mut roster = Roster::new();
        roster.join("a");

        let departure = roster.leave("a");
        assert!(departure.now_empty);
        assert_eq!(departure.new_host, None);
        assert_eq!(roster.host(), None);

        assert!(roster.join("b"));
    }

    #[test]
    fn test_leave_unknown_player_is_idempotent() {
        let mut roster = Roster::new();
        roster.join("a");
        roster.leave("a");

        let again = roster.leave("a");
        assert!(!again.removed);
        assert!(again.now_empty);
    }

    #[test]
    fn test_host_is_always_a_member() {
        let mut roster = Roster::new();
        for id in ["a", "b", "c", "d"] {
            roster.join(id);
        }
        for id in ["a", "c", "b"] {
            roster.leave(id);
            let host = roster.host().unwrap();
            assert!(roster.contains(host));
        }
        assert_eq!(roster.host(), Some("d"));
    }
}
