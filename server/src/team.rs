//! Court-side balancing and spawn placement.

use rand::Rng;
use shared::{PlayerAction, Vector2};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn of(action: &PlayerAction) -> Side {
        if action.is_right_side() {
            Side::Right
        } else {
            Side::Left
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    fn sign(self) -> f32 {
        match self {
            Side::Left => -1.0,
            Side::Right => 1.0,
        }
    }

    /// Players face the net, which is to the right of the left side.
    pub fn faces_right(self) -> bool {
        self == Side::Left
    }
}

/// Side for a newcomer: the one with fewer players, left on a tie.
pub fn choose_side(left_count: usize, right_count: usize) -> Side {
    if left_count > right_count {
        Side::Right
    } else {
        Side::Left
    }
}

/// Counts `(left, right)` players from their current actions.
pub fn count_sides<'a>(actions: impl IntoIterator<Item = &'a PlayerAction>) -> (usize, usize) {
    actions
        .into_iter()
        .fold((0, 0), |(left, right), action| match Side::of(action) {
            Side::Left => (left + 1, right),
            Side::Right => (left, right + 1),
        })
}

pub fn spawn_x<R: Rng + ?Sized>(rng: &mut R, side: Side, min_x: f32, max_x: f32) -> f32 {
    let magnitude = if max_x > min_x {
        rng.gen_range(min_x..=max_x)
    } else {
        min_x
    };
    side.sign() * magnitude
}

/// A fresh action placing a player on `side`, facing the net.
pub fn spawn_action<R: Rng + ?Sized>(rng: &mut R, side: Side, min_x: f32, max_x: f32) -> PlayerAction {
    PlayerAction {
        pos: Vector2::new(spawn_x(rng, side, min_x, max_x), 0.0),
        face_right: side.faces_right(),
        ..PlayerAction::default()
    }
}
