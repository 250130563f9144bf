use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

/// Average number of characters per word when estimating typing time.
const CHARS_PER_WORD: f64 = 5.0;
const SECONDS_IN_MINUTE: f64 = 60.0;

/// Bounded-random source for reply delays, typing speeds and idle waits.
pub struct TimingModel {
    rng: StdRng,
}

impl TimingModel {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Draws one sample from `N(avg, std_dev)`, clamped up to `minimum`.
    ///
    /// A sample below the floor is replaced by the floor, never re-drawn.
    /// A negative or non-finite `std_dev` yields the mean.
    pub fn draw(&mut self, avg: f64, std_dev: f64, minimum: f64) -> f64 {
        let normal = if std_dev.is_finite() && std_dev >= 0.0 {
            Normal::new(avg, std_dev).ok()
        } else {
            None
        };
        let sample = match normal {
            Some(normal) => normal.sample(&mut self.rng),
            None => avg,
        };

        if sample < minimum || sample.is_nan() {
            minimum
        } else {
            sample
        }
    }

    /// Uniform sample in `[min, max)`.
    pub fn uniform(&mut self, min: f64, max: f64) -> f64 {
        min + self.rng.gen::<f64>() * (max - min)
    }

    /// True with probability `p`.
    pub fn chance(&mut self, p: f64) -> bool {
        self.rng.gen::<f64>() < p
    }
}

/// Seconds needed to type `text` at `words_per_minute`.
pub fn typing_duration(text: &str, words_per_minute: f64) -> f64 {
    if words_per_minute <= 0.0 {
        return 0.0;
    }
    let words = text.chars().count() as f64 / CHARS_PER_WORD;
    words / (words_per_minute / SECONDS_IN_MINUTE)
}
