//! The engine adapter: the boundary between the pipeline and pixel math.
//!
//! This module defines the [`Engine`] trait, with one method per
//! [`OperationKind`](crate::operation::OperationKind), and the default
//! [`ImageEngine`] implementation backed by the `image` and `imageproc`
//! crates.
//!
//! # Strategy pattern
//!
//! The evaluator only ever calls [`Engine::apply`], which dispatches on
//! the operation with an exhaustive `match`. Swapping the pixel backend
//! (a GPU engine, a test double that records calls) means implementing
//! the per-kind methods; the pipeline model does not change.
//!
//! Every method must be a pure mapping: it reads the input image and
//! returns a new one, and may change the output dimensions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::operation::{FlipAxis, Operation, OperationKind};
use crate::types::{Dimensions, EngineError, Image};

/// Pixel sampling used when a transform maps output pixels back onto
/// the source grid (rotation, shear).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Interpolation {
    /// Take the closest source pixel: fastest, blocky.
    Nearest,
    /// Blend the four surrounding source pixels.
    #[default]
    Bilinear,
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => f.write_str("Nearest"),
            Self::Bilinear => f.write_str("Bilinear"),
        }
    }
}

/// Configuration for [`ImageEngine`].
///
/// Nothing here changes *which* transform an operation performs, only
/// engine-wide details the operation records do not carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Sampling for rotation and shear.
    pub interpolation: Interpolation,

    /// RGBA color for canvas regions a rotation or shear does not cover.
    pub fill: [u8; 4],

    /// Base seed for salt and pepper noise.
    ///
    /// The effective per-step seed also mixes in the input pixels and the
    /// probability, so replaying the same log over the same image always
    /// produces the same noise.
    pub noise_seed: u64,
}

impl EngineConfig {
    /// Default sampling for rotation and shear.
    pub const DEFAULT_INTERPOLATION: Interpolation = Interpolation::Bilinear;

    /// Default fill: fully transparent black.
    pub const DEFAULT_FILL: [u8; 4] = [0, 0, 0, 0];

    /// Default noise seed.
    pub const DEFAULT_NOISE_SEED: u64 = 0x5EED_CAFE;
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            interpolation: Self::DEFAULT_INTERPOLATION,
            fill: Self::DEFAULT_FILL,
            noise_seed: Self::DEFAULT_NOISE_SEED,
        }
    }
}

/// The external image-processing boundary: one pure function per
/// operation kind.
///
/// Implementors provide the per-kind methods; callers use
/// [`apply`](Self::apply).
///
/// # Errors
///
/// Every method returns [`EngineError`] when its input image or
/// parameters cannot be transformed, e.g. an empty image for a
/// dimension-dependent kernel. It never returns a partial image.
#[allow(clippy::missing_errors_doc)]
pub trait Engine {
    /// `clamp(v * gain + bias)` on every channel.
    fn linear(&self, image: &Image, gain: f64, bias: f64) -> Result<Image, EngineError>;

    /// Power-law mapping of the color channels.
    fn power(&self, image: &Image, gamma: f64) -> Result<Image, EngineError>;

    /// Convolve the color channels with a row-major kernel.
    fn convolution(
        &self,
        image: &Image,
        kernel: &[f64],
        width: u32,
        height: u32,
    ) -> Result<Image, EngineError>;

    /// Rotate counter-clockwise by `angle` degrees, growing the canvas.
    fn rotation(&self, image: &Image, angle: f64) -> Result<Image, EngineError>;

    /// Mirror along an axis.
    fn flip(&self, image: &Image, axis: FlipAxis) -> Result<Image, EngineError>;

    /// Histogram-equalize each color channel.
    fn equalize(&self, image: &Image) -> Result<Image, EngineError>;

    /// Bilinear resize by per-axis factors.
    fn scale(&self, image: &Image, width_factor: f64, height_factor: f64)
    -> Result<Image, EngineError>;

    /// Nearest-neighbor resize by per-axis factors.
    fn scale_nearest_neighbor(
        &self,
        image: &Image,
        width_factor: f64,
        height_factor: f64,
    ) -> Result<Image, EngineError>;

    /// Affine shear, growing the canvas.
    fn shear(&self, image: &Image, lambda: f64, miu: f64) -> Result<Image, EngineError>;

    /// Minimum over the city-block neighborhood of radius `distance`.
    fn min_filter(&self, image: &Image, distance: u32) -> Result<Image, EngineError>;

    /// Maximum over the city-block neighborhood of radius `distance`.
    fn max_filter(&self, image: &Image, distance: u32) -> Result<Image, EngineError>;

    /// Median over the city-block neighborhood of radius `distance`.
    fn median_filter(&self, image: &Image, distance: u32) -> Result<Image, EngineError>;

    /// Convert to luminance.
    fn grey_scale(&self, image: &Image) -> Result<Image, EngineError>;

    /// Remove `removal` columns from the right edge.
    fn crop_right(&self, image: &Image, removal: u32) -> Result<Image, EngineError>;

    /// Remove `removal` rows from the bottom edge.
    fn crop_bottom(&self, image: &Image, removal: u32) -> Result<Image, EngineError>;

    /// Set each pixel to white with the given probability.
    fn add_salt(&self, image: &Image, probability: f64) -> Result<Image, EngineError>;

    /// Set each pixel to black with the given probability.
    fn add_pepper(&self, image: &Image, probability: f64) -> Result<Image, EngineError>;

    /// Prewitt gradient edge map.
    fn prewitt_edge(&self, image: &Image, threshold: f64) -> Result<Image, EngineError>;

    /// Sobel gradient edge map.
    fn sobel_edge(&self, image: &Image, threshold: f64) -> Result<Image, EngineError>;

    /// Laplacian zero-crossing edge map.
    fn laplacian_edge(&self, image: &Image, threshold: f64) -> Result<Image, EngineError>;

    /// Laplacian-of-Gaussian zero-crossing edge map.
    fn laplacian_of_gaussian_edge(&self, image: &Image, threshold: f64)
    -> Result<Image, EngineError>;

    /// Apply one operation, dispatching to the matching per-kind method.
    ///
    /// # Errors
    ///
    /// Propagates the per-kind method's [`EngineError`].
    fn apply(&self, image: &Image, operation: &Operation) -> Result<Image, EngineError> {
        match operation {
            Operation::Linear { gain, bias } => self.linear(image, *gain, *bias),
            Operation::Power { gamma } => self.power(image, *gamma),
            Operation::Convolution {
                kernel,
                width,
                height,
            } => self.convolution(image, kernel, *width, *height),
            Operation::Rotation { angle } => self.rotation(image, *angle),
            Operation::Flip { axis } => self.flip(image, *axis),
            Operation::Equalize => self.equalize(image),
            Operation::Scale {
                width_factor,
                height_factor,
            } => self.scale(image, *width_factor, *height_factor),
            Operation::ScaleNearestNeighbor {
                width_factor,
                height_factor,
            } => self.scale_nearest_neighbor(image, *width_factor, *height_factor),
            Operation::Shear { lambda, miu } => self.shear(image, *lambda, *miu),
            Operation::MinFilter { distance } => self.min_filter(image, *distance),
            Operation::MaxFilter { distance } => self.max_filter(image, *distance),
            Operation::MedianFilter { distance } => self.median_filter(image, *distance),
            Operation::GreyScale => self.grey_scale(image),
            Operation::CropRight { removal } => self.crop_right(image, *removal),
            Operation::CropBottom { removal } => self.crop_bottom(image, *removal),
            Operation::AddSalt { probability } => self.add_salt(image, *probability),
            Operation::AddPepper { probability } => self.add_pepper(image, *probability),
            Operation::PrewittEdge { threshold } => self.prewitt_edge(image, *threshold),
            Operation::SobelEdge { threshold } => self.sobel_edge(image, *threshold),
            Operation::LaplacianEdge { threshold } => self.laplacian_edge(image, *threshold),
            Operation::LaplacianOfGaussianEdge { threshold } => {
                self.laplacian_of_gaussian_edge(image, *threshold)
            }
        }
    }
}

/// Reject a zero-area input for transforms that need pixels.
pub(crate) fn require_pixels(kind: OperationKind, image: &Image) -> Result<(), EngineError> {
    let dimensions = Dimensions::of(image);
    if dimensions.is_empty() {
        return Err(EngineError::EmptyImage { kind, dimensions });
    }
    Ok(())
}

/// Reject NaN and infinite parameters.
pub(crate) fn require_finite(
    kind: OperationKind,
    name: &'static str,
    value: f64,
) -> Result<f64, EngineError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EngineError::InvalidParameter {
            kind,
            name,
            value,
            reason: "must be finite",
        })
    }
}

/// The default engine: CPU transforms built on `image` and `imageproc`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageEngine {
    config: EngineConfig,
}

impl ImageEngine {
    /// Create an engine with the given configuration.
    #[must_use]
    pub const fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// The engine's configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl Engine for ImageEngine {
    fn linear(&self, image: &Image, gain: f64, bias: f64) -> Result<Image, EngineError> {
        crate::point::linear(image, gain, bias)
    }

    fn power(&self, image: &Image, gamma: f64) -> Result<Image, EngineError> {
        crate::point::power(image, gamma)
    }

    fn convolution(
        &self,
        image: &Image,
        kernel: &[f64],
        width: u32,
        height: u32,
    ) -> Result<Image, EngineError> {
        crate::filter::convolution(image, kernel, width, height)
    }

    fn rotation(&self, image: &Image, angle: f64) -> Result<Image, EngineError> {
        crate::geometry::rotate(image, angle, self.config.interpolation, self.config.fill)
    }

    fn flip(&self, image: &Image, axis: FlipAxis) -> Result<Image, EngineError> {
        Ok(crate::geometry::flip(image, axis))
    }

    fn equalize(&self, image: &Image) -> Result<Image, EngineError> {
        Ok(crate::histogram::equalize(image))
    }

    fn scale(
        &self,
        image: &Image,
        width_factor: f64,
        height_factor: f64,
    ) -> Result<Image, EngineError> {
        crate::geometry::scale(
            image,
            OperationKind::Scale,
            width_factor,
            height_factor,
            image::imageops::FilterType::Triangle,
        )
    }

    fn scale_nearest_neighbor(
        &self,
        image: &Image,
        width_factor: f64,
        height_factor: f64,
    ) -> Result<Image, EngineError> {
        crate::geometry::scale(
            image,
            OperationKind::ScaleNearestNeighbor,
            width_factor,
            height_factor,
            image::imageops::FilterType::Nearest,
        )
    }

    fn shear(&self, image: &Image, lambda: f64, miu: f64) -> Result<Image, EngineError> {
        crate::geometry::shear(
            image,
            lambda,
            miu,
            self.config.interpolation,
            self.config.fill,
        )
    }

    fn min_filter(&self, image: &Image, distance: u32) -> Result<Image, EngineError> {
        crate::filter::rank_filter(image, OperationKind::MinFilter, distance)
    }

    fn max_filter(&self, image: &Image, distance: u32) -> Result<Image, EngineError> {
        crate::filter::rank_filter(image, OperationKind::MaxFilter, distance)
    }

    fn median_filter(&self, image: &Image, distance: u32) -> Result<Image, EngineError> {
        crate::filter::rank_filter(image, OperationKind::MedianFilter, distance)
    }

    fn grey_scale(&self, image: &Image) -> Result<Image, EngineError> {
        Ok(crate::point::grey_scale(image))
    }

    fn crop_right(&self, image: &Image, removal: u32) -> Result<Image, EngineError> {
        Ok(crate::geometry::crop_right(image, removal))
    }

    fn crop_bottom(&self, image: &Image, removal: u32) -> Result<Image, EngineError> {
        Ok(crate::geometry::crop_bottom(image, removal))
    }

    fn add_salt(&self, image: &Image, probability: f64) -> Result<Image, EngineError> {
        crate::point::impulse_noise(
            image,
            crate::point::Impulse::Salt,
            probability,
            self.config.noise_seed,
        )
    }

    fn add_pepper(&self, image: &Image, probability: f64) -> Result<Image, EngineError> {
        crate::point::impulse_noise(
            image,
            crate::point::Impulse::Pepper,
            probability,
            self.config.noise_seed,
        )
    }

    fn prewitt_edge(&self, image: &Image, threshold: f64) -> Result<Image, EngineError> {
        crate::edge::gradient_edges(image, crate::edge::Gradient::Prewitt, threshold)
    }

    fn sobel_edge(&self, image: &Image, threshold: f64) -> Result<Image, EngineError> {
        crate::edge::gradient_edges(image, crate::edge::Gradient::Sobel, threshold)
    }

    fn laplacian_edge(&self, image: &Image, threshold: f64) -> Result<Image, EngineError> {
        crate::edge::zero_crossing_edges(image, crate::edge::Laplacian::Plain, threshold)
    }

    fn laplacian_of_gaussian_edge(
        &self,
        image: &Image,
        threshold: f64,
    ) -> Result<Image, EngineError> {
        crate::edge::zero_crossing_edges(image, crate::edge::Laplacian::OfGaussian, threshold)
    }
}
