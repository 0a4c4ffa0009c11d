//! Weighted random selection, used for operation mixes and payload size distributions.
use rand::Rng;
use serde::{de, Deserialize, Deserializer};
use std::fmt;

/// Ordered weighted choice with a fallback.
///
/// Sampling walks the entries accumulating their weights and picks the first entry whose
/// cumulative weight reaches the draw. Weights are used as given: they are not normalized, so
/// a mix whose weights sum to less than 1 picks the fallback for the remaining probability, and
/// entries past a cumulative sum of 1 are never picked. Existing configurations rely on this.
#[derive(Clone, Debug, PartialEq)]
pub struct WeightedChoice<T> {
    entries: Vec<(T, f64)>,
    fallback: T,
}

impl<T> WeightedChoice<T> {
    pub fn new(entries: Vec<(T, f64)>, fallback: T) -> Self {
        Self { entries, fallback }
    }

    /// Picks the entry for a draw in `[0, 1)`.
    pub fn pick(&self, draw: f64) -> &T {
        let mut cumulative = 0.;
        for (value, weight) in &self.entries {
            cumulative += weight;
            if draw <= cumulative {
                return value;
            }
        }
        &self.fallback
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> &T {
        self.pick(rng.gen::<f64>())
    }

    pub fn entries(&self) -> &[(T, f64)] {
        &self.entries
    }
}

/// A payload size, written either as a byte count or as a label like `"10KB"` or `"1MB"`.
///
/// Units are binary: `1KB` is 1024 bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteSize(pub u64);

impl ByteSize {
    pub const KB: u64 = 1024;
    pub const MB: u64 = 1024 * 1024;
    pub const GB: u64 = 1024 * 1024 * 1024;

    pub fn parse(label: &str) -> Option<Self> {
        let label = label.trim();
        let split = label
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(label.len());
        let (digits, unit) = label.split_at(split);
        let count: u64 = digits.parse().ok()?;

        let multiplier = match unit.trim().to_ascii_uppercase().as_str() {
            "" | "B" => 1,
            "K" | "KB" | "KIB" => Self::KB,
            "M" | "MB" | "MIB" => Self::MB,
            "G" | "GB" | "GIB" => Self::GB,
            _ => return None,
        };

        count.checked_mul(multiplier).map(ByteSize)
    }

    pub fn bytes(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}B", self.0)
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bytes(u64),
            Label(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Bytes(bytes) => Ok(ByteSize(bytes)),
            Raw::Label(label) => ByteSize::parse(&label)
                .ok_or_else(|| de::Error::custom(format!("invalid size `{label}`"))),
        }
    }
}
