//! Shared types for the strata operation pipeline.

use serde::{Deserialize, Serialize};

use crate::operation::OperationKind;

/// Re-export `RgbaImage` so downstream crates can hand images to the
/// pipeline without depending on `image` directly.
pub use image::RgbaImage;

/// The raster every pipeline step consumes and produces.
///
/// Pixels are RGBA, 8 bits per channel, stored row-major. This matches
/// the layout of browser `ImageData`, so buffers can cross a canvas
/// boundary without repacking.
pub type Image = RgbaImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of an existing image.
    #[must_use]
    pub fn of(image: &Image) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }

    /// Returns `true` if either axis is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Total pixel count (`width * height`).
    #[must_use]
    pub const fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Why an operation was rejected before entering the log.
///
/// Every variant names the offending kind or field so a form can point
/// the user at the exact input that needs fixing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidOperation {
    /// The kind name does not match any known operation.
    #[error("unknown operation kind {0:?}")]
    UnknownKind(String),

    /// A parameter required by the kind was not supplied.
    #[error("{kind} is missing required parameter `{field}`")]
    MissingField {
        /// The operation kind being constructed.
        kind: OperationKind,
        /// The absent parameter name.
        field: &'static str,
    },

    /// A parameter was supplied that the kind does not accept.
    #[error("{kind} does not accept parameter `{field}`")]
    UnexpectedField {
        /// The operation kind being constructed.
        kind: OperationKind,
        /// The extra parameter name.
        field: String,
    },

    /// The parameters have the right names but the wrong types.
    #[error("malformed {kind} parameters: {message}")]
    MalformedParameters {
        /// The operation kind being constructed.
        kind: OperationKind,
        /// Deserializer message describing the mismatch.
        message: String,
    },

    /// A convolution kernel whose coefficient count is not `width * height`.
    #[error("convolution kernel has {len} coefficients but is declared {width}x{height}")]
    KernelSizeMismatch {
        /// Number of coefficients supplied.
        len: usize,
        /// Declared kernel width.
        width: u32,
        /// Declared kernel height.
        height: u32,
    },

    /// A convolution kernel with a zero width or height.
    #[error("convolution kernel must have non-zero width and height")]
    EmptyKernel,
}

/// Failure reported by an [`Engine`](crate::engine::Engine) for one step.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    /// The step needs pixels to work with but the image has a zero axis.
    #[error("{kind} cannot be applied to an empty {dimensions} image")]
    EmptyImage {
        /// The operation that was attempted.
        kind: OperationKind,
        /// Dimensions of the offending input.
        dimensions: Dimensions,
    },

    /// A parameter value is outside the range the transform accepts.
    #[error("{kind} parameter `{name}` = {value} is out of range: {reason}")]
    InvalidParameter {
        /// The operation that was attempted.
        kind: OperationKind,
        /// Parameter name.
        name: &'static str,
        /// The rejected value.
        value: f64,
        /// Human-readable constraint that was violated.
        reason: &'static str,
    },

    /// The transform would produce an image too large (or degenerate) to
    /// allocate.
    #[error("{kind} would produce an unrepresentable {width}x{height} image")]
    DimensionOverflow {
        /// The operation that was attempted.
        kind: OperationKind,
        /// Requested output width before rounding.
        width: f64,
        /// Requested output height before rounding.
        height: f64,
    },
}

/// Errors surfaced by the pipeline to its callers.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    /// The operation was rejected; the log is unchanged.
    #[error("invalid operation: {0}")]
    InvalidOperation(#[from] InvalidOperation),

    /// The engine failed while folding the log. The stored output keeps
    /// its previous value.
    #[error("evaluation failed at step {at_index}: {cause}")]
    Evaluation {
        /// Zero-based index into the operation sequence of the failing step.
        at_index: usize,
        /// What the engine reported.
        cause: EngineError,
    },
}
