//! Neighborhood filters: linear convolution and rank (min, max, median)
//! filters.
//!
//! Borders are mirrored: a coordinate one step outside the image reads
//! the edge pixel, two steps outside reads its neighbor, and so on. This
//! keeps flat regions flat right up to the border, where zero padding
//! would darken them.

use crate::engine::{require_finite, require_pixels};
use crate::operation::OperationKind;
use crate::point::to_channel;
use crate::types::{EngineError, Image};

/// Map a possibly out-of-range coordinate into `0..n` by mirroring.
///
/// The mirrored signal has period `2n`: `-1 -> 0`, `n -> n - 1`.
/// `n` must be non-zero.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn reflect(i: i64, n: u32) -> u32 {
    let n = i64::from(n);
    let period = 2 * n;
    let m = i.rem_euclid(period);
    (if m < n { m } else { period - 1 - m }) as u32
}

/// A single-channel `f64` raster, row-major.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Plane {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) values: Vec<f64>,
}

impl Plane {
    /// Extract one channel of an image.
    pub(crate) fn from_channel(image: &Image, channel: usize) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            values: image.pixels().map(|p| f64::from(p.0[channel])).collect(),
        }
    }

    /// Value at `(x, y)` with mirrored borders.
    pub(crate) fn at(&self, x: i64, y: i64) -> f64 {
        let x = reflect(x, self.width) as usize;
        let y = reflect(y, self.height) as usize;
        self.values[y * self.width as usize + x]
    }

    /// Convolve with a row-major `kw x kh` kernel.
    ///
    /// This is a true convolution (the kernel is flipped), anchored at
    /// `(kw / 2, kh / 2)`. The plane must be non-empty.
    pub(crate) fn convolve(&self, kernel: &[f64], kw: u32, kh: u32) -> Self {
        let cx = i64::from(kw / 2);
        let cy = i64::from(kh / 2);
        let taps: Vec<(i64, i64, f64)> = kernel
            .iter()
            .enumerate()
            .filter(|&(_, &k)| k != 0.0)
            .map(|(i, &k)| {
                let i = i as u64;
                let kx = (i % u64::from(kw)).cast_signed();
                let ky = (i / u64::from(kw)).cast_signed();
                (kx - cx, ky - cy, k)
            })
            .collect();

        let mut values = Vec::with_capacity(self.values.len());
        for y in 0..i64::from(self.height) {
            for x in 0..i64::from(self.width) {
                let acc = taps
                    .iter()
                    .fold(0.0, |acc, &(dx, dy, k)| k.mul_add(self.at(x - dx, y - dy), acc));
                values.push(acc);
            }
        }
        Self {
            width: self.width,
            height: self.height,
            values,
        }
    }
}

/// Convolve the color channels with a row-major kernel; alpha is
/// preserved and results are rounded and clamped.
///
/// # Errors
///
/// Returns [`EngineError::EmptyImage`] for a zero-area input and
/// [`EngineError::InvalidParameter`] for non-finite coefficients.
pub fn convolution(
    image: &Image,
    kernel: &[f64],
    width: u32,
    height: u32,
) -> Result<Image, EngineError> {
    require_pixels(OperationKind::Convolution, image)?;
    for &k in kernel {
        require_finite(OperationKind::Convolution, "kernel", k)?;
    }

    let planes: [Plane; 3] =
        std::array::from_fn(|c| Plane::from_channel(image, c).convolve(kernel, width, height));

    let mut out = image.clone();
    for (i, p) in out.pixels_mut().enumerate() {
        p.0 = [
            to_channel(planes[0].values[i]),
            to_channel(planes[1].values[i]),
            to_channel(planes[2].values[i]),
            p.0[3],
        ];
    }
    Ok(out)
}

/// Largest rank-filter neighborhood, in pixels, a filter may sample.
pub const MAX_WINDOW_PIXELS: u64 = 1 << 20;

/// Pixel count of the diamond of radius `distance`, `2d(d + 1) + 1`,
/// or `None` on overflow.
fn diamond_len(distance: u32) -> Option<u64> {
    let d = u64::from(distance);
    d.checked_add(1)?
        .checked_mul(d)?
        .checked_mul(2)?
        .checked_add(1)
}

/// Offsets of the city-block (diamond) neighborhood `|dx| + |dy| <= d`.
///
/// Contains `2d(d + 1) + 1` entries, the center included.
pub(crate) fn diamond(distance: u32) -> Vec<(i64, i64)> {
    let d = i64::from(distance);
    (-d..=d)
        .flat_map(|dy| {
            let reach = d - dy.abs();
            (-reach..=reach).map(move |dx| (dx, dy))
        })
        .collect()
}

/// Which order statistic a rank filter picks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rank {
    Min,
    Max,
    Median,
}

impl Rank {
    fn pick(self, window: &mut [u8]) -> u8 {
        match self {
            Self::Min => window.iter().copied().min().unwrap_or_default(),
            Self::Max => window.iter().copied().max().unwrap_or_default(),
            Self::Median => {
                // The diamond always has an odd number of entries.
                let mid = window.len() / 2;
                *window.select_nth_unstable(mid).1
            }
        }
    }
}

/// Apply a min, max, or median filter over the diamond neighborhood of
/// radius `distance`, per color channel. Alpha is preserved.
///
/// `kind` selects the statistic; any kind other than the three rank
/// filters is treated as median.
///
/// # Errors
///
/// Returns [`EngineError::EmptyImage`] for a zero-area input and
/// [`EngineError::InvalidParameter`] if the neighborhood would exceed
/// [`MAX_WINDOW_PIXELS`].
pub fn rank_filter(image: &Image, kind: OperationKind, distance: u32) -> Result<Image, EngineError> {
    require_pixels(kind, image)?;
    let rank = match kind {
        OperationKind::MinFilter => Rank::Min,
        OperationKind::MaxFilter => Rank::Max,
        _ => Rank::Median,
    };

    if distance == 0 {
        return Ok(image.clone());
    }
    if diamond_len(distance).is_none_or(|len| len > MAX_WINDOW_PIXELS) {
        return Err(EngineError::InvalidParameter {
            kind,
            name: "distance",
            value: f64::from(distance),
            reason: "neighborhood too large",
        });
    }

    let offsets = diamond(distance);
    let (width, height) = image.dimensions();
    let mut window = vec![0_u8; offsets.len()];
    let mut out = image.clone();
    for (x, y, p) in out.enumerate_pixels_mut() {
        for c in 0..3 {
            for (slot, &(dx, dy)) in window.iter_mut().zip(&offsets) {
                let sx = reflect(i64::from(x) + dx, width);
                let sy = reflect(i64::from(y) + dy, height);
                *slot = image.get_pixel(sx, sy).0[c];
            }
            p.0[c] = rank.pick(&mut window);
        }
    }
    Ok(out)
}
