//! Edge maps: gradient-magnitude (Prewitt, Sobel) and zero-crossing
//! (Laplacian, Laplacian of Gaussian) detectors.
//!
//! All detectors work on luma and produce an opaque black image with
//! edge pixels set to white.

use image::{GrayImage, Luma, Rgba};
use imageproc::definitions::Image as Raster;
use imageproc::filter::filter_clamped;
use imageproc::kernel;

use crate::engine::{require_finite, require_pixels};
use crate::filter::Plane;
use crate::operation::OperationKind;
use crate::types::{EngineError, Image};

const EDGE: Rgba<u8> = Rgba([255, 255, 255, 255]);
const BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// First-derivative operator pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gradient {
    /// Uniformly weighted 3x3 differences.
    Prewitt,
    /// Center-weighted 3x3 differences.
    Sobel,
}

impl Gradient {
    const fn kind(self) -> OperationKind {
        match self {
            Self::Prewitt => OperationKind::PrewittEdge,
            Self::Sobel => OperationKind::SobelEdge,
        }
    }
}

/// Second-derivative operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Laplacian {
    /// 3x3 eight-neighbor Laplacian.
    Plain,
    /// 5x5 Laplacian of Gaussian, less sensitive to noise.
    OfGaussian,
}

/// 3x3 eight-neighbor Laplacian.
const LAPLACIAN_3X3: [f64; 9] = [1.0, 1.0, 1.0, 1.0, -8.0, 1.0, 1.0, 1.0, 1.0];

/// 5x5 Laplacian of Gaussian approximation.
#[rustfmt::skip]
const LAPLACIAN_OF_GAUSSIAN_5X5: [f64; 25] = [
     0.0,  0.0, -1.0,  0.0,  0.0,
     0.0, -1.0, -2.0, -1.0,  0.0,
    -1.0, -2.0, 16.0, -2.0, -1.0,
     0.0, -1.0, -2.0, -1.0,  0.0,
     0.0,  0.0, -1.0,  0.0,  0.0,
];

impl Laplacian {
    const fn kind(self) -> OperationKind {
        match self {
            Self::Plain => OperationKind::LaplacianEdge,
            Self::OfGaussian => OperationKind::LaplacianOfGaussianEdge,
        }
    }

    const fn kernel(self) -> (&'static [f64], u32, u32) {
        match self {
            Self::Plain => (&LAPLACIAN_3X3, 3, 3),
            Self::OfGaussian => (&LAPLACIAN_OF_GAUSSIAN_5X5, 5, 5),
        }
    }
}

/// Mark pixels whose gradient magnitude `|gx| + |gy|` exceeds `threshold`.
///
/// # Errors
///
/// Returns [`EngineError::EmptyImage`] for a zero-area input and
/// [`EngineError::InvalidParameter`] for a non-finite threshold.
pub fn gradient_edges(
    image: &Image,
    gradient: Gradient,
    threshold: f64,
) -> Result<Image, EngineError> {
    let kind = gradient.kind();
    require_pixels(kind, image)?;
    let threshold = require_finite(kind, "threshold", threshold)?;

    let gray: GrayImage = image::imageops::grayscale(image);
    let (gx, gy): (Raster<Luma<i16>>, Raster<Luma<i16>>) = match gradient {
        Gradient::Prewitt => (
            filter_clamped(&gray, kernel::PREWITT_HORIZONTAL_3X3),
            filter_clamped(&gray, kernel::PREWITT_VERTICAL_3X3),
        ),
        Gradient::Sobel => (
            filter_clamped(&gray, kernel::SOBEL_HORIZONTAL_3X3),
            filter_clamped(&gray, kernel::SOBEL_VERTICAL_3X3),
        ),
    };

    Ok(Image::from_fn(image.width(), image.height(), |x, y| {
        let h = f64::from(gx.get_pixel(x, y).0[0]);
        let v = f64::from(gy.get_pixel(x, y).0[0]);
        if h.abs() + v.abs() > threshold {
            EDGE
        } else {
            BACKGROUND
        }
    }))
}

/// Opposing neighbor pairs tested for a sign change: horizontal,
/// vertical, and both diagonals.
const OPPOSING_PAIRS: [((i64, i64), (i64, i64)); 4] = [
    ((-1, 0), (1, 0)),
    ((0, -1), (0, 1)),
    ((-1, -1), (1, 1)),
    ((1, -1), (-1, 1)),
];

/// Mark pixels where the Laplacian response crosses zero between an
/// opposing pair of neighbors with a jump larger than `threshold`.
///
/// # Errors
///
/// Returns [`EngineError::EmptyImage`] for a zero-area input and
/// [`EngineError::InvalidParameter`] for a non-finite threshold.
pub fn zero_crossing_edges(
    image: &Image,
    laplacian: Laplacian,
    threshold: f64,
) -> Result<Image, EngineError> {
    let kind = laplacian.kind();
    require_pixels(kind, image)?;
    let threshold = require_finite(kind, "threshold", threshold)?;

    let gray = image::imageops::grayscale(image);
    let luma = Plane {
        width: gray.width(),
        height: gray.height(),
        values: gray.pixels().map(|p| f64::from(p.0[0])).collect(),
    };
    let (k, kw, kh) = laplacian.kernel();
    let response = luma.convolve(k, kw, kh);

    Ok(Image::from_fn(image.width(), image.height(), |x, y| {
        let (x, y) = (i64::from(x), i64::from(y));
        let crossing = OPPOSING_PAIRS.iter().any(|&((ax, ay), (bx, by))| {
            let a = response.at(x + ax, y + ay);
            let b = response.at(x + bx, y + by);
            (a < 0.0) != (b < 0.0) && (a - b).abs() > threshold
        });
        if crossing { EDGE } else { BACKGROUND }
    }))
}
