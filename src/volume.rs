//! Volume Selection
//!
//! Chooses which storage volume a new file lands on. The only strategy here
//! is uniform random choice; placement-aware strategies plug in through the
//! same trait.

use rand::rngs::ThreadRng;
use rand::Rng;

use crate::error::{Error, Result};

/// Strategy for picking a volume out of the configured options.
pub trait VolumeChooser {
    /// Pick one volume for a new file
    fn choose<'a>(&mut self, options: &'a [String]) -> Result<&'a str>;

    /// Narrow the option set before choosing; the default keeps all options
    fn choosable<'a>(&self, options: &'a [String]) -> &'a [String] {
        options
    }
}

/// Uniform random choice over the option set.
pub struct RandomVolumeChooser<R: Rng = ThreadRng> {
    rng: R,
}

impl RandomVolumeChooser<ThreadRng> {
    pub fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
        }
    }
}

impl Default for RandomVolumeChooser<ThreadRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> RandomVolumeChooser<R> {
    /// Build with a caller-supplied generator
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> VolumeChooser for RandomVolumeChooser<R> {
    fn choose<'a>(&mut self, options: &'a [String]) -> Result<&'a str> {
        if options.is_empty() {
            return Err(Error::Config("no volumes configured to choose from".into()));
        }
        let index = self.rng.gen_range(0..options.len());
        Ok(options[index].as_str())
    }
}
