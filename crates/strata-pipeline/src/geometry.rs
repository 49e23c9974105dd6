//! Geometric transforms: rotation, shear, flips, resizing, and crops.
//!
//! Rotation and shear share one inverse-mapping affine warp. The output
//! canvas grows to the bounding box of the transformed source, and each
//! output pixel center is mapped back into the source and sampled.
//! Points that land outside the source take the configured fill color.

use image::Rgba;
use image::imageops::{self, FilterType};

use crate::engine::{Interpolation, require_finite, require_pixels};
use crate::operation::{FlipAxis, OperationKind};
use crate::point::to_channel;
use crate::types::{EngineError, Image};

/// Largest output, in pixels, a transform may allocate (1 GiB of RGBA).
pub const MAX_OUTPUT_PIXELS: u64 = 1 << 28;

/// Slack subtracted before rounding a transformed extent up, so that
/// floating-point noise on an exact fit does not add a pixel.
const EXTENT_EPSILON: f64 = 1e-6;

/// Validate a computed output size and convert it to pixel counts.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn output_size(kind: OperationKind, width: f64, height: f64) -> Result<(u32, u32), EngineError> {
    let overflow = || EngineError::DimensionOverflow {
        kind,
        width,
        height,
    };
    if !(width.is_finite() && height.is_finite()) || width < 1.0 || height < 1.0 {
        return Err(overflow());
    }
    if width > f64::from(u32::MAX) || height > f64::from(u32::MAX) {
        return Err(overflow());
    }
    let (w, h) = (width as u32, height as u32);
    if u64::from(w) * u64::from(h) > MAX_OUTPUT_PIXELS {
        return Err(overflow());
    }
    Ok((w, h))
}

/// Mirror along an axis. [`FlipAxis::X`] swaps top and bottom,
/// [`FlipAxis::Y`] swaps left and right.
#[must_use]
pub fn flip(image: &Image, axis: FlipAxis) -> Image {
    match axis {
        FlipAxis::X => imageops::flip_vertical(image),
        FlipAxis::Y => imageops::flip_horizontal(image),
    }
}

/// Drop `removal` columns from the right. Removing the full width or more
/// yields a zero-width image.
#[must_use]
pub fn crop_right(image: &Image, removal: u32) -> Image {
    let width = image.width().saturating_sub(removal);
    imageops::crop_imm(image, 0, 0, width, image.height()).to_image()
}

/// Drop `removal` rows from the bottom. Removing the full height or more
/// yields a zero-height image.
#[must_use]
pub fn crop_bottom(image: &Image, removal: u32) -> Image {
    let height = image.height().saturating_sub(removal);
    imageops::crop_imm(image, 0, 0, image.width(), height).to_image()
}

/// Resize to `round(w * width_factor) x round(h * height_factor)`.
///
/// # Errors
///
/// - [`EngineError::EmptyImage`] for a zero-area input.
/// - [`EngineError::InvalidParameter`] for a non-finite or non-positive
///   factor.
/// - [`EngineError::DimensionOverflow`] if the result would have a zero
///   axis or exceed [`MAX_OUTPUT_PIXELS`].
pub fn scale(
    image: &Image,
    kind: OperationKind,
    width_factor: f64,
    height_factor: f64,
    filter: FilterType,
) -> Result<Image, EngineError> {
    require_pixels(kind, image)?;
    for (name, factor) in [("width_factor", width_factor), ("height_factor", height_factor)] {
        if !(factor.is_finite() && factor > 0.0) {
            return Err(EngineError::InvalidParameter {
                kind,
                name,
                value: factor,
                reason: "must be finite and positive",
            });
        }
    }

    let (width, height) = output_size(
        kind,
        (f64::from(image.width()) * width_factor).round(),
        (f64::from(image.height()) * height_factor).round(),
    )?;
    if (width, height) == image.dimensions() {
        return Ok(image.clone());
    }
    Ok(imageops::resize(image, width, height, filter))
}

/// Rotate counter-clockwise (as displayed, y pointing down) by `angle`
/// degrees.
///
/// Quarter turns are exact pixel permutations; any other angle goes
/// through the affine warp.
///
/// # Errors
///
/// Returns [`EngineError::EmptyImage`] for a zero-area input,
/// [`EngineError::InvalidParameter`] for a non-finite angle, and
/// [`EngineError::DimensionOverflow`] if the canvas would be too large.
pub fn rotate(
    image: &Image,
    angle: f64,
    interpolation: Interpolation,
    fill: [u8; 4],
) -> Result<Image, EngineError> {
    let kind = OperationKind::Rotation;
    require_pixels(kind, image)?;
    let angle = require_finite(kind, "angle", angle)?.rem_euclid(360.0);

    #[allow(clippy::float_cmp)]
    let quarter = if angle == 0.0 {
        Some(image.clone())
    } else if angle == 90.0 {
        Some(imageops::rotate270(image))
    } else if angle == 180.0 {
        Some(imageops::rotate180(image))
    } else if angle == 270.0 {
        Some(imageops::rotate90(image))
    } else {
        None
    };
    if let Some(rotated) = quarter {
        return Ok(rotated);
    }

    let (s, c) = angle.to_radians().sin_cos();
    warp(image, kind, [[c, s], [-s, c]], interpolation, fill)
}

/// Shear by the affine matrix `[[1 + lambda * miu, lambda], [miu, 1]]`.
///
/// # Errors
///
/// Returns [`EngineError::EmptyImage`] for a zero-area input,
/// [`EngineError::InvalidParameter`] for non-finite parameters, and
/// [`EngineError::DimensionOverflow`] if the canvas would be too large.
pub fn shear(
    image: &Image,
    lambda: f64,
    miu: f64,
    interpolation: Interpolation,
    fill: [u8; 4],
) -> Result<Image, EngineError> {
    let kind = OperationKind::Shear;
    require_pixels(kind, image)?;
    let lambda = require_finite(kind, "lambda", lambda)?;
    let miu = require_finite(kind, "miu", miu)?;
    warp(
        image,
        kind,
        [[lambda.mul_add(miu, 1.0), lambda], [miu, 1.0]],
        interpolation,
        fill,
    )
}

/// Apply the forward 2x2 `matrix` about the image center.
fn warp(
    image: &Image,
    kind: OperationKind,
    matrix: [[f64; 2]; 2],
    interpolation: Interpolation,
    fill: [u8; 4],
) -> Result<Image, EngineError> {
    let [[a, b], [c, d]] = matrix;
    let det = a.mul_add(d, -(b * c));
    if !det.is_finite() || det.abs() < f64::EPSILON {
        return Err(EngineError::DimensionOverflow {
            kind,
            width: f64::NAN,
            height: f64::NAN,
        });
    }
    let inverse = [[d / det, -b / det], [-c / det, a / det]];

    let half_w = f64::from(image.width()) / 2.0;
    let half_h = f64::from(image.height()) / 2.0;
    // The transformed box is symmetric about the origin, so two corners
    // bound it.
    let extent_x = (a * half_w).abs() + (b * half_h).abs();
    let extent_y = (c * half_w).abs() + (d * half_h).abs();
    let (width, height) = output_size(
        kind,
        (2.0 * extent_x - EXTENT_EPSILON).ceil(),
        (2.0 * extent_y - EXTENT_EPSILON).ceil(),
    )?;
    log::trace!(
        "{kind}: warp {}x{} -> {width}x{height}",
        image.width(),
        image.height()
    );

    let out_half_w = f64::from(width) / 2.0;
    let out_half_h = f64::from(height) / 2.0;
    let [[ia, ib], [ic, id]] = inverse;
    let max_x = f64::from(image.width()) - 0.5;
    let max_y = f64::from(image.height()) - 0.5;
    let fill = Rgba(fill);

    Ok(Image::from_fn(width, height, |ox, oy| {
        let dx = f64::from(ox) + 0.5 - out_half_w;
        let dy = f64::from(oy) + 0.5 - out_half_h;
        let sx = ia.mul_add(dx, ib * dy) + half_w - 0.5;
        let sy = ic.mul_add(dx, id * dy) + half_h - 0.5;
        if sx < -0.5 || sy < -0.5 || sx > max_x || sy > max_y {
            return fill;
        }
        match interpolation {
            Interpolation::Nearest => sample_nearest(image, sx, sy),
            Interpolation::Bilinear => sample_bilinear(image, sx, sy),
        }
    }))
}

/// Clamp a sample coordinate to a valid pixel index.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_index(v: f64, len: u32) -> u32 {
    v.clamp(0.0, f64::from(len - 1)) as u32
}

fn sample_nearest(image: &Image, x: f64, y: f64) -> Rgba<u8> {
    *image.get_pixel(
        clamp_index(x.round(), image.width()),
        clamp_index(y.round(), image.height()),
    )
}

fn sample_bilinear(image: &Image, x: f64, y: f64) -> Rgba<u8> {
    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);
    let (w, h) = image.dimensions();
    let (xa, xb) = (clamp_index(x0, w), clamp_index(x0 + 1.0, w));
    let (ya, yb) = (clamp_index(y0, h), clamp_index(y0 + 1.0, h));

    let p00 = image.get_pixel(xa, ya).0;
    let p10 = image.get_pixel(xb, ya).0;
    let p01 = image.get_pixel(xa, yb).0;
    let p11 = image.get_pixel(xb, yb).0;

    Rgba(std::array::from_fn(|i| {
        let top = fx.mul_add(f64::from(p10[i]) - f64::from(p00[i]), f64::from(p00[i]));
        let bottom = fx.mul_add(f64::from(p11[i]) - f64::from(p01[i]), f64::from(p01[i]));
        to_channel(fy.mul_add(bottom - top, top))
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);
    const CLEAR: [u8; 4] = [0, 0, 0, 0];

    fn red_blue() -> Image {
        Image::from_fn(2, 1, |x, _| if x == 0 { RED } else { BLUE })
    }

    fn numbered(width: u32, height: u32) -> Image {
        Image::from_fn(width, height, |x, y| {
            Rgba([u8::try_from(x).unwrap(), u8::try_from(y).unwrap(), 0, 255])
        })
    }

    #[test]
    fn flip_x_swaps_top_and_bottom() {
        let img = numbered(2, 3);
        let out = flip(&img, FlipAxis::X);
        assert_eq!(out.get_pixel(0, 0).0[1], 2);
        assert_eq!(out.get_pixel(0, 2).0[1], 0);
    }

    #[test]
    fn flip_y_swaps_left_and_right() {
        let out = flip(&red_blue(), FlipAxis::Y);
        assert_eq!(*out.get_pixel(0, 0), BLUE);
        assert_eq!(*out.get_pixel(1, 0), RED);
    }

    #[test]
    fn flip_twice_is_identity() {
        let img = numbered(4, 3);
        assert_eq!(flip(&flip(&img, FlipAxis::X), FlipAxis::X), img);
    }

    #[test]
    fn crop_right_removes_columns() {
        let out = crop_right(&numbered(10, 10), 2);
        assert_eq!(out.dimensions(), (8, 10));
        assert_eq!(out.get_pixel(7, 0).0[0], 7);
    }

    #[test]
    fn crop_bottom_removes_rows() {
        let out = crop_bottom(&numbered(10, 10), 3);
        assert_eq!(out.dimensions(), (10, 7));
    }

    #[test]
    fn over_crop_yields_empty_image() {
        assert_eq!(crop_right(&numbered(4, 4), 9).dimensions(), (0, 4));
        assert_eq!(crop_bottom(&numbered(4, 4), 4).dimensions(), (4, 0));
    }

    #[test]
    fn scale_rounds_new_size() {
        let img = numbered(10, 4);
        let out = scale(&img, OperationKind::Scale, 1.25, 0.5, FilterType::Triangle).unwrap();
        assert_eq!(out.dimensions(), (13, 2));
    }

    #[test]
    fn nearest_upscale_duplicates_pixels() {
        let out = scale(
            &red_blue(),
            OperationKind::ScaleNearestNeighbor,
            2.0,
            2.0,
            FilterType::Nearest,
        )
        .unwrap();
        assert_eq!(out.dimensions(), (4, 2));
        assert_eq!(*out.get_pixel(0, 1), RED);
        assert_eq!(*out.get_pixel(1, 0), RED);
        assert_eq!(*out.get_pixel(2, 1), BLUE);
        assert_eq!(*out.get_pixel(3, 0), BLUE);
    }

    #[test]
    fn scale_rejects_bad_factors() {
        let img = numbered(4, 4);
        for f in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = scale(&img, OperationKind::Scale, f, 1.0, FilterType::Triangle).unwrap_err();
            assert!(matches!(err, EngineError::InvalidParameter { .. }), "{f}");
        }
    }

    #[test]
    fn scale_to_zero_pixels_overflows() {
        let err = scale(&numbered(4, 4), OperationKind::Scale, 0.01, 1.0, FilterType::Triangle)
            .unwrap_err();
        assert!(matches!(err, EngineError::DimensionOverflow { .. }));
    }

    #[test]
    fn scale_empty_image_fails() {
        let err = scale(&Image::new(0, 5), OperationKind::Scale, 2.0, 2.0, FilterType::Triangle)
            .unwrap_err();
        assert!(matches!(err, EngineError::EmptyImage { .. }));
    }

    #[test]
    fn rotation_zero_is_identity() {
        let img = numbered(5, 3);
        assert_eq!(rotate(&img, 0.0, Interpolation::Bilinear, CLEAR).unwrap(), img);
        assert_eq!(rotate(&img, 360.0, Interpolation::Bilinear, CLEAR).unwrap(), img);
    }

    #[test]
    fn rotation_quarter_turn_swaps_dimensions() {
        let out = rotate(&numbered(10, 4), 90.0, Interpolation::Bilinear, CLEAR).unwrap();
        assert_eq!(out.dimensions(), (4, 10));
    }

    #[test]
    fn rotation_quarter_turn_is_counter_clockwise() {
        let out = rotate(&red_blue(), 90.0, Interpolation::Nearest, CLEAR).unwrap();
        assert_eq!(out.dimensions(), (1, 2));
        assert_eq!(*out.get_pixel(0, 0), BLUE);
        assert_eq!(*out.get_pixel(0, 1), RED);
    }

    #[test]
    fn warp_agrees_with_exact_quarter_turn() {
        let img = numbered(6, 3);
        let exact = rotate(&img, 90.0, Interpolation::Nearest, CLEAR).unwrap();
        let (s, c) = 90.0_f64.to_radians().sin_cos();
        let warped = warp(
            &img,
            OperationKind::Rotation,
            [[c, s], [-s, c]],
            Interpolation::Nearest,
            CLEAR,
        )
        .unwrap();
        assert_eq!(warped, exact);
    }

    #[test]
    fn rotation_grows_canvas_and_fills_corners() {
        let img = Image::from_pixel(10, 10, RED);
        let out = rotate(&img, 45.0, Interpolation::Bilinear, [1, 2, 3, 4]).unwrap();
        assert_eq!(out.dimensions(), (15, 15));
        assert_eq!(out.get_pixel(0, 0).0, [1, 2, 3, 4]);
        assert_eq!(*out.get_pixel(7, 7), RED);
    }

    #[test]
    fn shear_zero_is_identity() {
        let img = numbered(4, 3);
        assert_eq!(shear(&img, 0.0, 0.0, Interpolation::Bilinear, CLEAR).unwrap(), img);
    }

    #[test]
    fn horizontal_shear_widens_canvas() {
        let out = shear(&numbered(4, 4), 0.5, 0.0, Interpolation::Nearest, CLEAR).unwrap();
        assert_eq!(out.dimensions(), (6, 4));
    }

    #[test]
    fn rotation_of_empty_image_fails() {
        let err = rotate(&Image::new(0, 0), 30.0, Interpolation::Bilinear, CLEAR).unwrap_err();
        assert!(matches!(
            err,
            EngineError::EmptyImage {
                kind: OperationKind::Rotation,
                ..
            }
        ));
    }
}
