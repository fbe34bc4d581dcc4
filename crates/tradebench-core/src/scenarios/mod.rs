//! The scenarios shipped with the harness.

pub mod order_processing;
pub mod scoring;
pub mod voice_commands;

use rand::seq::SliceRandom;
use rand::Rng;

use crate::services::Side;

pub use order_processing::{OrderMixTest, OrderProcessingLoadTest, OrderProcessingTest};
pub use voice_commands::{VoiceCommandAccuracyTest, VoiceCommandProcessingTest};

/// Symbols the order scenarios trade.
pub const SYMBOLS: [&str; 5] = ["AAPL", "MSFT", "GOOG", "AMZN", "TSLA"];

fn random_symbol<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    SYMBOLS.choose(rng).copied().unwrap_or(SYMBOLS[0])
}

fn random_side<R: Rng + ?Sized>(rng: &mut R) -> Side {
    if rng.gen_bool(0.5) {
        Side::Buy
    } else {
        Side::Sell
    }
}

/// Arithmetic mean; 0 for an empty slice.
fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn mean_of_empty_is_zero() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(mean(&[1.0, 2.0, 6.0]), 3.0);
    }

    #[test]
    fn sides_are_roughly_balanced() {
        let mut rng = StdRng::seed_from_u64(4);
        let buys = (0..2_000).filter(|_| random_side(&mut rng) == Side::Buy).count();
        assert!((900..1_100).contains(&buys), "buys = {buys}");
    }

    #[test]
    fn symbols_come_from_the_fixed_list() {
        let mut rng = StdRng::seed_from_u64(4);
        assert!((0..100).all(|_| SYMBOLS.contains(&random_symbol(&mut rng))));
    }
}
