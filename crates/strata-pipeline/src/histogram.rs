//! Per-channel histogram equalization.

use crate::point::to_channel;
use crate::types::Image;

/// Intensity counts for one 8-bit channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram {
    buckets: [u64; 256],
}

impl Histogram {
    /// Count the values of `channel` (0 = red .. 3 = alpha) across `image`.
    #[must_use]
    pub fn of_channel(image: &Image, channel: usize) -> Self {
        let mut buckets = [0_u64; 256];
        for p in image.pixels() {
            buckets[usize::from(p.0[channel])] += 1;
        }
        Self { buckets }
    }

    /// Number of pixels with the given intensity.
    #[must_use]
    pub const fn count(&self, intensity: u8) -> u64 {
        self.buckets[intensity as usize]
    }

    /// Total number of samples.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.buckets.iter().sum()
    }

    /// Lookup table that spreads this histogram's cumulative distribution
    /// over `0..=255`.
    ///
    /// Uses `(cdf(v) - cdf_min) / (n - cdf_min)`, so the darkest occupied
    /// level maps to 0 and the brightest to 255. A single-level channel
    /// maps to itself.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn equalization_table(&self) -> [u8; 256] {
        let total = self.total();
        let cdf_min = self.buckets.iter().copied().find(|&c| c > 0).unwrap_or(0);
        let span = total - cdf_min;

        let mut table = [0_u8; 256];
        let mut cdf = 0_u64;
        for (v, (slot, &count)) in table.iter_mut().zip(&self.buckets).enumerate() {
            cdf += count;
            *slot = if span == 0 {
                v as u8
            } else {
                to_channel(cdf.saturating_sub(cdf_min) as f64 / span as f64 * 255.0)
            };
        }
        table
    }
}

/// Equalize the red, green, and blue channels independently. Alpha is
/// preserved.
#[must_use]
pub fn equalize(image: &Image) -> Image {
    let tables: [[u8; 256]; 3] =
        std::array::from_fn(|c| Histogram::of_channel(image, c).equalization_table());
    let mut out = image.clone();
    for p in out.pixels_mut() {
        for (c, table) in tables.iter().enumerate() {
            p.0[c] = table[usize::from(p.0[c])];
        }
    }
    out
}
