//! Room codes for player-hosted lobbies.

use crate::error::{Result, ServerError};
use rand::Rng;
use shared::{ROOM_CODE_ALPHABET, ROOM_CODE_LEN};

pub fn random_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    let alphabet = ROOM_CODE_ALPHABET.as_bytes();
    (0..ROOM_CODE_LEN)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())] as char)
        .collect()
}

/// Draws codes until `claim` accepts one, giving up after `attempts` draws.
///
/// `claim` must reserve the code atomically (for example a registry
/// create-if-absent) and return `None` when the code is taken.
pub fn reserve<R, T, F>(rng: &mut R, attempts: usize, mut claim: F) -> Result<T>
where
    R: Rng + ?Sized,
    F: FnMut(String) -> Option<T>,
{
    for _ in 0..attempts {
        if let Some(claimed) = claim(random_code(rng)) {
            return Ok(claimed);
        }
    }
    Err(ServerError::Capacity { attempts })
}
