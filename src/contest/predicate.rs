//! Winner predicate
//!
//! The draw itself. [`HashDraw`] pins the hash so that winner selection is
//! identical across runs, processes and machines:
//!
//! ```text
//! crc32( len(first) ‖ first ‖ len(last) ‖ last ‖ len(doc) ‖ doc ‖ len(date) ‖ date )
//! ```
//!
//! Each `len` is a 4-byte big-endian byte count and `date` is the
//! `YYYY-MM-DD` text. A contestant wins when the checksum is divisible by
//! the configured modulus.

use std::time::Duration;

use super::Contestant;

/// Classifies a contestant as winner or non-winner
///
/// Implementations must be pure: the same contestant always yields the
/// same answer.
pub trait WinnerPredicate: Send + Sync {
    fn is_winner(&self, contestant: &Contestant) -> bool;
}

impl<F> WinnerPredicate for F
where
    F: Fn(&Contestant) -> bool + Send + Sync,
{
    fn is_winner(&self, contestant: &Contestant) -> bool {
        self(contestant)
    }
}

/// Hash-based draw with a simulated per-contestant cost
#[derive(Debug, Clone)]
pub struct HashDraw {
    modulus: u32,
    evaluation_delay: Duration,
}

impl HashDraw {
    /// `modulus` must be non-zero; `Config::validate` enforces it
    pub fn new(modulus: u32, evaluation_delay: Duration) -> Self {
        Self {
            modulus: modulus.max(1),
            evaluation_delay,
        }
    }

    /// The pinned draw hash of a contestant
    pub fn draw_hash(contestant: &Contestant) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        let date = contestant.birth_date_iso();
        for field in [
            contestant.first_name(),
            contestant.last_name(),
            contestant.document(),
            date.as_str(),
        ] {
            hasher.update(&(field.len() as u32).to_be_bytes());
            hasher.update(field.as_bytes());
        }
        hasher.finalize()
    }

    pub fn modulus(&self) -> u32 {
        self.modulus
    }
}

impl WinnerPredicate for HashDraw {
    fn is_winner(&self, contestant: &Contestant) -> bool {
        if !self.evaluation_delay.is_zero() {
            std::thread::sleep(self.evaluation_delay);
        }
        Self::draw_hash(contestant) % self.modulus == 0
    }
}

/// Evaluate every contestant and keep the winners in input order
///
/// `cancelled` is polled before each evaluation; once it reports true the
/// partial result is discarded and `None` is returned.
pub fn select_winners<P, C>(
    predicate: &P,
    contestants: Vec<Contestant>,
    mut cancelled: C,
) -> Option<Vec<Contestant>>
where
    P: WinnerPredicate + ?Sized,
    C: FnMut() -> bool,
{
    let mut winners = Vec::new();
    for contestant in contestants {
        if cancelled() {
            return None;
        }
        if predicate.is_winner(&contestant) {
            winners.push(contestant);
        }
    }
    Some(winners)
}
