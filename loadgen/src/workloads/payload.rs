//! Deterministic random payloads with a log-normal size distribution.

use anyhow::Result;
use bytes::Bytes;
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use rand_distr::{Distribution, LogNormal};

use crate::config::PayloadConfig;

/// Samples payload sizes from a log-normal distribution pinned at the
/// configured p50 and p99.
///
/// Both the size and the contents of a payload are derived from a seed, so
/// the same task index always produces the same payload and a validation
/// pass can regenerate it for comparison.
#[derive(Clone, Debug)]
pub struct PayloadSpec {
    sizes: LogNormal<f64>,
}

impl PayloadSpec {
    /// Builds the size distribution from the configured quantiles.
    pub fn new(config: &PayloadConfig) -> Result<Self> {
        let p50 = config.p50.0.max(1) as f64;
        let p99 = config.p99.0.max(1) as f64;

        // Inspired by <https://stats.stackexchange.com/a/649432>: 2.3263 is
        // the standard normal quantile at 0.99.
        let mu = p50.ln();
        let sigma = (p99.ln() - mu) / 2.3263;
        let sizes = LogNormal::new(mu, sigma.abs())?;

        Ok(Self { sizes })
    }

    /// Generates the payload for the given seed.
    pub fn payload(&self, seed: u64) -> Bytes {
        let mut rng = SmallRng::seed_from_u64(seed);
        let len = self.sizes.sample(&mut rng) as usize;

        let mut contents = vec![0; len];
        rng.fill_bytes(&mut contents);
        Bytes::from(contents)
    }
}

#[cfg(test)]
mod tests {
    use bytesize::ByteSize;

    use super::*;

    fn spec(p50: u64, p99: u64) -> PayloadSpec {
        PayloadSpec::new(&PayloadConfig {
            p50: ByteSize::b(p50),
            p99: ByteSize::b(p99),
        })
        .unwrap()
    }

    #[test]
    fn payloads_are_deterministic_per_seed() {
        let spec = spec(1000, 10_000);
        assert_eq!(spec.payload(42), spec.payload(42));
        assert_ne!(spec.payload(42), spec.payload(43));
    }

    #[test]
    fn sizes_roughly_match_the_configured_quantiles() {
        let spec = spec(1000, 10_000);
        let mut sizes: Vec<_> = (0..1000).map(|seed| spec.payload(seed).len()).collect();
        sizes.sort_unstable();

        let median = sizes[sizes.len() / 2];
        assert!(median > 500, "median {median} too small");
        assert!(median < 2000, "median {median} too large");
        // The p99 tail exists but stays in the same order of magnitude.
        assert!(sizes[989] > 4_000);
        assert!(sizes[989] < 40_000);
    }
}
