//! Size comparison between an original and its compressed artifact.

use serde::Serialize;

/// Compressed size as a percentage of the original, rounded up to two decimals.
///
/// A value of 100 or more means the output is not smaller than the original;
/// `warning` is set so a consumer can flag it instead of hiding it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Savings {
    /// Percentage in hundredths (5000 == 50.00%)
    pub hundredths: u64,
    pub warning: bool,
}

impl Savings {
    pub fn percent(&self) -> f64 {
        self.hundredths as f64 / 100.0
    }
}

/// `ceil(compressed / original * 10000) / 100`, computed in integers.
///
/// Returns `None` for an empty original, for which no ratio exists.
pub fn savings(original_size: u64, compressed_size: u64) -> Option<Savings> {
    if original_size == 0 {
        return None;
    }
    let original = original_size as u128;
    let scaled = compressed_size as u128 * 10_000;
    let hundredths = scaled.div_ceil(original);
    let hundredths = u64::try_from(hundredths).unwrap_or(u64::MAX);
    Some(Savings {
        hundredths,
        warning: hundredths >= 10_000,
    })
}

impl std::fmt::Display for Savings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}%", self.hundredths / 100, self.hundredths % 100)
    }
}
