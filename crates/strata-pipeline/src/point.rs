//! Per-pixel transforms: each output pixel depends only on the matching
//! input pixel.
//!
//! Linear and power mappings, sRGB-correct greyscale, and seeded
//! salt/pepper impulse noise.

use std::hash::Hasher;

use rand::SeedableRng;
use rand::distr::{Bernoulli, Distribution};
use rand::rngs::StdRng;
use siphasher::sip::SipHasher13;

use crate::engine::require_finite;
use crate::operation::OperationKind;
use crate::types::{EngineError, Image};

/// Round a floating-point channel value into `0..=255`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn to_channel(v: f64) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Tabulate a channel mapping over every 8-bit input value.
#[allow(clippy::cast_possible_truncation)]
fn lookup_table<T>(f: impl Fn(f64) -> T) -> [T; 256] {
    std::array::from_fn(|i| f(f64::from(i as u8)))
}

/// `clamp(v * gain + bias)` on all four channels, alpha included.
///
/// # Errors
///
/// Returns [`EngineError::InvalidParameter`] if `gain` or `bias` is not
/// finite.
pub fn linear(image: &Image, gain: f64, bias: f64) -> Result<Image, EngineError> {
    let gain = require_finite(OperationKind::Linear, "gain", gain)?;
    let bias = require_finite(OperationKind::Linear, "bias", bias)?;

    let lut = lookup_table(|v| to_channel(v.mul_add(gain, bias)));
    let mut out = image.clone();
    for p in out.pixels_mut() {
        p.0 = p.0.map(|c| lut[usize::from(c)]);
    }
    Ok(out)
}

/// `255 * (v / 255)^gamma` on the color channels; alpha is preserved.
///
/// # Errors
///
/// Returns [`EngineError::InvalidParameter`] if `gamma` is not finite or
/// is negative.
pub fn power(image: &Image, gamma: f64) -> Result<Image, EngineError> {
    let gamma = require_finite(OperationKind::Power, "gamma", gamma)?;
    if gamma < 0.0 {
        return Err(EngineError::InvalidParameter {
            kind: OperationKind::Power,
            name: "gamma",
            value: gamma,
            reason: "must not be negative",
        });
    }

    let lut = lookup_table(|v| to_channel(255.0 * (v / 255.0).powf(gamma)));
    let mut out = image.clone();
    for p in out.pixels_mut() {
        let [r, g, b, a] = p.0;
        p.0 = [
            lut[usize::from(r)],
            lut[usize::from(g)],
            lut[usize::from(b)],
            a,
        ];
    }
    Ok(out)
}

/// sRGB transfer function, decoded to linear light.
fn linearize(encoded: f64) -> f64 {
    if encoded <= 0.040_45 {
        encoded / 12.92
    } else {
        ((encoded + 0.055) / 1.055).powf(2.4)
    }
}

/// Inverse of [`linearize`].
fn encode_srgb(linear: f64) -> f64 {
    if linear <= 0.003_130_8 {
        linear * 12.92
    } else {
        1.055_f64.mul_add(linear.powf(1.0 / 2.4), -0.055)
    }
}

/// Convert to grey using Rec. 709 luminance in linear light.
///
/// Each channel is decoded from sRGB, weighted, summed, and the luminance
/// re-encoded to sRGB so mid-tones keep their perceived brightness.
/// Alpha is preserved.
#[must_use]
pub fn grey_scale(image: &Image) -> Image {
    let decode = lookup_table(|v| linearize(v / 255.0));
    let mut out = image.clone();
    for p in out.pixels_mut() {
        let [r, g, b, a] = p.0;
        let y = 0.0722_f64.mul_add(
            decode[usize::from(b)],
            0.2126_f64.mul_add(decode[usize::from(r)], 0.7152 * decode[usize::from(g)]),
        );
        let v = to_channel(encode_srgb(y) * 255.0);
        p.0 = [v, v, v, a];
    }
    out
}

/// Impulse noise polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Impulse {
    /// Hits become white.
    Salt,
    /// Hits become black.
    Pepper,
}

impl Impulse {
    const fn kind(self) -> OperationKind {
        match self {
            Self::Salt => OperationKind::AddSalt,
            Self::Pepper => OperationKind::AddPepper,
        }
    }

    const fn value(self) -> u8 {
        match self {
            Self::Salt => u8::MAX,
            Self::Pepper => 0,
        }
    }
}

/// Derive the RNG seed for one noise step.
///
/// The same image, probability, and base seed always give the same seed,
/// so a replayed log reproduces the same noise.
fn noise_seed(image: &Image, impulse: Impulse, probability: f64, base_seed: u64) -> u64 {
    let mut hasher = SipHasher13::new_with_keys(base_seed, impulse.kind() as u64);
    hasher.write_u32(image.width());
    hasher.write_u32(image.height());
    hasher.write_u64(probability.to_bits());
    hasher.write(image.as_raw());
    hasher.finish()
}

/// Independently set each pixel's color channels to the impulse value
/// with the given probability. Alpha is preserved.
///
/// # Errors
///
/// Returns [`EngineError::InvalidParameter`] if `probability` is not in
/// `[0, 1]`.
pub fn impulse_noise(
    image: &Image,
    impulse: Impulse,
    probability: f64,
    base_seed: u64,
) -> Result<Image, EngineError> {
    let bernoulli =
        Bernoulli::new(probability).map_err(|_| EngineError::InvalidParameter {
            kind: impulse.kind(),
            name: "probability",
            value: probability,
            reason: "must be within [0, 1]",
        })?;

    let mut rng = StdRng::seed_from_u64(noise_seed(image, impulse, probability, base_seed));
    let v = impulse.value();
    let mut out = image.clone();
    let mut hits = 0_u64;
    for p in out.pixels_mut() {
        if bernoulli.sample(&mut rng) {
            p.0 = [v, v, v, p.0[3]];
            hits += 1;
        }
    }
    log::trace!(
        "{}: {hits} of {} pixels hit at p={probability}",
        impulse.kind(),
        u64::from(image.width()) * u64::from(image.height()),
    );
    Ok(out)
}
