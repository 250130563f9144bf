use std::path::Path;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Attempts made to find a line short enough before giving up.
const GENERATION_TRIES: usize = 100;

/// Produces short sentences. `None` means the generator gave up.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, max_length: usize) -> Option<String>;
}

/// Samples lines from a plain-text corpus, one sentence per line.
pub struct CorpusGenerator {
    lines: Vec<String>,
    rng: Mutex<StdRng>,
}

impl CorpusGenerator {
    pub fn new(lines: Vec<String>) -> Self {
        Self::with_rng(lines, StdRng::from_entropy())
    }

    pub fn with_rng(lines: Vec<String>, rng: StdRng) -> Self {
        let lines = lines
            .into_iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        Self {
            lines,
            rng: Mutex::new(rng),
        }
    }

    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::new(content.lines().map(str::to_string).collect()))
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl TextGenerator for CorpusGenerator {
    fn generate(&self, max_length: usize) -> Option<String> {
        let mut rng = self.rng.lock().ok()?;
        (0..GENERATION_TRIES)
            .filter_map(|_| self.lines.choose(&mut *rng))
            .find(|line| line.chars().count() <= max_length)
            .cloned()
    }
}
