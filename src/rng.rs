//! Deterministic random number generation
//!
//! Every draw is seeded from (master seed, stream key, day, distribution tag)
//! and uses a fresh ChaCha8 generator, so a value never depends on which
//! other draws happened before it or on which thread made them.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Binomial, Distribution as Sampler, Gamma, Normal, Poisson};
use serde::{Deserialize, Serialize};

use crate::error::{SimError, SimResult};

const LCG_MUL: u64 = 6364136223846793005;
const LCG_INC: u64 = 1442695040888963407;
const GOLDEN: u64 = 0x9e37_79b9_7f4a_7c15;
const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Rejection attempts before a truncated normal falls back to its floor.
const MAX_REJECTIONS: usize = 256;

fn mix(state: u64, value: u64) -> u64 {
    let state = state.wrapping_mul(LCG_MUL).wrapping_add(LCG_INC);
    (state ^ value.wrapping_mul(GOLDEN)).rotate_left(29)
}

// FNV-1a; `std`'s hasher is not stable across releases.
fn hash_label(label: &str) -> u64 {
    label.bytes().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Composite identity of a random draw (component, tile, resource, compartment...).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StreamKey(u64);

impl StreamKey {
    pub fn new(component: &str) -> Self {
        Self(hash_label(component))
    }

    pub fn with(self, label: &str) -> Self {
        Self(mix(self.0, hash_label(label)))
    }

    pub fn with_index(self, value: u64) -> Self {
        Self(mix(self.0, value))
    }

    /// Adds the tile identity, restricted to the configured key columns.
    pub fn with_tile(self, columns: &KeyColumns, x: u32, y: u32) -> Self {
        let mut key = self;
        if columns.x {
            key = key.with("x").with_index(u64::from(x));
        }
        if columns.y {
            key = key.with("y").with_index(u64::from(y));
        }
        key
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Which tile identity fields participate in stream keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyColumns {
    pub x: bool,
    pub y: bool,
}

impl KeyColumns {
    pub fn from_names(names: &[String]) -> SimResult<Self> {
        let mut columns = KeyColumns { x: false, y: false };
        for name in names {
            match name.as_str() {
                "x" => columns.x = true,
                "y" => columns.y = true,
                other => {
                    return Err(SimError::config(format!(
                        "unknown randomness key column '{other}' (expected 'x' or 'y')"
                    )))
                }
            }
        }
        if !columns.x && !columns.y {
            return Err(SimError::config(
                "randomness.key_columns must name at least one of 'x', 'y'",
            ));
        }
        Ok(columns)
    }
}

impl Default for KeyColumns {
    fn default() -> Self {
        Self { x: true, y: true }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Distribution {
    Uniform,
    Normal { mean: f64, std: f64 },
    /// Normal truncated on the left at zero.
    TruncatedNormal { mean: f64, std: f64 },
    Gamma { shape: f64, scale: f64 },
    Bernoulli { p: f64 },
    Binomial { n: u64, p: f64 },
    Poisson { lambda: f64 },
}

impl Distribution {
    fn name(&self) -> &'static str {
        match self {
            Distribution::Uniform => "uniform",
            Distribution::Normal { .. } => "normal",
            Distribution::TruncatedNormal { .. } => "truncated normal",
            Distribution::Gamma { .. } => "gamma",
            Distribution::Bernoulli { .. } => "bernoulli",
            Distribution::Binomial { .. } => "binomial",
            Distribution::Poisson { .. } => "poisson",
        }
    }

    fn tag(&self) -> u64 {
        hash_label(self.name())
    }

    fn validate(&self) -> SimResult<()> {
        let name = self.name();
        let finite = |label: &str, value: f64| {
            if value.is_finite() {
                Ok(())
            } else {
                Err(SimError::parameter(name, format!("{label} must be finite, got {value}")))
            }
        };
        let probability = |p: f64| {
            if (0.0..=1.0).contains(&p) {
                Ok(())
            } else {
                Err(SimError::parameter(name, format!("p must lie in [0, 1], got {p}")))
            }
        };
        match *self {
            Distribution::Uniform => Ok(()),
            Distribution::Normal { mean, std } | Distribution::TruncatedNormal { mean, std } => {
                finite("mean", mean)?;
                finite("std", std)?;
                if std <= 0.0 {
                    return Err(SimError::parameter(name, format!("std must be > 0, got {std}")));
                }
                Ok(())
            }
            Distribution::Gamma { shape, scale } => {
                finite("shape", shape)?;
                finite("scale", scale)?;
                if shape <= 0.0 {
                    return Err(SimError::parameter(name, format!("shape must be > 0, got {shape}")));
                }
                if scale <= 0.0 {
                    return Err(SimError::parameter(name, format!("scale must be > 0, got {scale}")));
                }
                Ok(())
            }
            Distribution::Bernoulli { p } | Distribution::Binomial { p, .. } => probability(p),
            Distribution::Poisson { lambda } => {
                finite("lambda", lambda)?;
                if lambda < 0.0 {
                    return Err(SimError::parameter(name, format!("lambda must be >= 0, got {lambda}")));
                }
                Ok(())
            }
        }
    }

    fn sample(&self, rng: &mut ChaCha8Rng) -> SimResult<f64> {
        let name = self.name();
        let value = match *self {
            Distribution::Uniform => rng.gen::<f64>(),
            Distribution::Normal { mean, std } => Normal::new(mean, std)
                .map_err(|err| SimError::parameter(name, err.to_string()))?
                .sample(rng),
            Distribution::TruncatedNormal { mean, std } => {
                let normal =
                    Normal::new(mean, std).map_err(|err| SimError::parameter(name, err.to_string()))?;
                (0..MAX_REJECTIONS)
                    .map(|_| normal.sample(rng))
                    .find(|value| *value >= 0.0)
                    .unwrap_or(0.0)
            }
            Distribution::Gamma { shape, scale } => Gamma::new(shape, scale)
                .map_err(|err| SimError::parameter(name, err.to_string()))?
                .sample(rng),
            Distribution::Bernoulli { p } => {
                if rng.gen_bool(p) {
                    1.0
                } else {
                    0.0
                }
            }
            Distribution::Binomial { n, p } => Binomial::new(n, p)
                .map_err(|err| SimError::parameter(name, err.to_string()))?
                .sample(rng) as f64,
            Distribution::Poisson { lambda } => {
                if lambda == 0.0 {
                    0.0
                } else {
                    Poisson::new(lambda)
                        .map_err(|err| SimError::parameter(name, err.to_string()))?
                        .sample(rng)
                }
            }
        };
        Ok(value)
    }
}

/// Order-independent random source shared (read-only) by every system.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RandomStream {
    master_seed: u64,
}

impl RandomStream {
    pub fn new(seed: u64) -> Self {
        Self { master_seed: seed }
    }

    pub fn seed(&self) -> u64 {
        self.master_seed
    }

    /// Create a deterministic generator for a specific (key, day, tag).
    pub fn generator(&self, key: StreamKey, day: i64, tag: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.derive_seed(key, day, tag))
    }

    fn derive_seed(&self, key: StreamKey, day: i64, tag: u64) -> u64 {
        let mut seed = mix(self.master_seed, key.raw());
        seed = mix(seed, day as u64);
        mix(seed, tag)
    }

    pub fn draw(&self, key: StreamKey, day: i64, distribution: Distribution) -> SimResult<f64> {
        distribution.validate()?;
        let mut rng = self.generator(key, day, distribution.tag());
        distribution.sample(&mut rng)
    }

    pub fn uniform(&self, key: StreamKey, day: i64) -> SimResult<f64> {
        self.draw(key, day, Distribution::Uniform)
    }

    pub fn normal(&self, key: StreamKey, day: i64, mean: f64, std: f64) -> SimResult<f64> {
        self.draw(key, day, Distribution::Normal { mean, std })
    }

    pub fn truncated_normal(&self, key: StreamKey, day: i64, mean: f64, std: f64) -> SimResult<f64> {
        self.draw(key, day, Distribution::TruncatedNormal { mean, std })
    }

    pub fn gamma(&self, key: StreamKey, day: i64, shape: f64, scale: f64) -> SimResult<f64> {
        self.draw(key, day, Distribution::Gamma { shape, scale })
    }

    pub fn chance(&self, key: StreamKey, day: i64, p: f64) -> SimResult<bool> {
        Ok(self.draw(key, day, Distribution::Bernoulli { p })? > 0.5)
    }

    pub fn binomial(&self, key: StreamKey, day: i64, n: u64, p: f64) -> SimResult<u64> {
        Ok(self.draw(key, day, Distribution::Binomial { n, p })? as u64)
    }

    pub fn poisson(&self, key: StreamKey, day: i64, lambda: f64) -> SimResult<u64> {
        Ok(self.draw(key, day, Distribution::Poisson { lambda })? as u64)
    }
}
