//! The operation model: a closed set of tagged, parameterized transforms.
//!
//! An [`Operation`] is an immutable value describing one step of a
//! pipeline. Its [`OperationKind`] is fixed at construction, and its
//! parameter record carries exactly the fields that kind requires.
//! Editing a step means removing it and appending a new one.
//!
//! # Dispatch
//!
//! Both [`Operation`] and [`OperationKind`] are closed enums, so every
//! consumer that matches on them (the evaluator, the engine adapter,
//! display code) must handle every kind. Adding a kind is a compile
//! error at each unhandled site rather than a runtime fallback.
//!
//! # Untyped construction
//!
//! Forms and command-line front ends usually hold a kind name and a bag
//! of named values. [`Operation::from_parts`] turns that into a typed
//! operation, rejecting unknown kinds, missing or extra fields, and
//! values of the wrong type with an [`InvalidOperation`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::InvalidOperation;

/// Axis to mirror along for [`Operation::Flip`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlipAxis {
    /// Mirror along the x-axis: the top row becomes the bottom row.
    X,
    /// Mirror along the y-axis: the left column becomes the right column.
    Y,
}

impl fmt::Display for FlipAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X => f.write_str("x"),
            Self::Y => f.write_str("y"),
        }
    }
}

/// The name ("kind") of an operation, without its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    /// Per-channel `v * gain + bias`.
    Linear,
    /// Gamma (power-law) mapping.
    Power,
    /// Arbitrary kernel convolution.
    Convolution,
    /// Rotation by an angle in degrees.
    Rotation,
    /// Mirror along an axis.
    Flip,
    /// Histogram equalization.
    Equalize,
    /// Bilinear resize by per-axis factors.
    Scale,
    /// Nearest-neighbor resize by per-axis factors.
    ScaleNearestNeighbor,
    /// Affine shear.
    Shear,
    /// Minimum rank filter.
    MinFilter,
    /// Maximum rank filter.
    MaxFilter,
    /// Median rank filter.
    MedianFilter,
    /// Luminance conversion.
    GreyScale,
    /// Remove columns from the right edge.
    CropRight,
    /// Remove rows from the bottom edge.
    CropBottom,
    /// White impulse noise.
    AddSalt,
    /// Black impulse noise.
    AddPepper,
    /// Prewitt gradient edges.
    PrewittEdge,
    /// Sobel gradient edges.
    SobelEdge,
    /// Laplacian zero-crossing edges.
    LaplacianEdge,
    /// Laplacian-of-Gaussian zero-crossing edges.
    LaplacianOfGaussianEdge,
}

impl OperationKind {
    /// Every kind, in registry order.
    pub const ALL: [Self; 21] = [
        Self::Linear,
        Self::Power,
        Self::Convolution,
        Self::Rotation,
        Self::Flip,
        Self::Equalize,
        Self::Scale,
        Self::ScaleNearestNeighbor,
        Self::Shear,
        Self::MinFilter,
        Self::MaxFilter,
        Self::MedianFilter,
        Self::GreyScale,
        Self::CropRight,
        Self::CropBottom,
        Self::AddSalt,
        Self::AddPepper,
        Self::PrewittEdge,
        Self::SobelEdge,
        Self::LaplacianEdge,
        Self::LaplacianOfGaussianEdge,
    ];

    /// The kind's canonical name, as used in [`Operation::from_parts`].
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Linear => "Linear",
            Self::Power => "Power",
            Self::Convolution => "Convolution",
            Self::Rotation => "Rotation",
            Self::Flip => "Flip",
            Self::Equalize => "Equalize",
            Self::Scale => "Scale",
            Self::ScaleNearestNeighbor => "ScaleNearestNeighbor",
            Self::Shear => "Shear",
            Self::MinFilter => "MinFilter",
            Self::MaxFilter => "MaxFilter",
            Self::MedianFilter => "MedianFilter",
            Self::GreyScale => "GreyScale",
            Self::CropRight => "CropRight",
            Self::CropBottom => "CropBottom",
            Self::AddSalt => "AddSalt",
            Self::AddPepper => "AddPepper",
            Self::PrewittEdge => "PrewittEdge",
            Self::SobelEdge => "SobelEdge",
            Self::LaplacianEdge => "LaplacianEdge",
            Self::LaplacianOfGaussianEdge => "LaplacianOfGaussianEdge",
        }
    }

    /// The exact set of parameter names this kind requires.
    #[must_use]
    pub const fn fields(self) -> &'static [&'static str] {
        match self {
            Self::Linear => &["gain", "bias"],
            Self::Power => &["gamma"],
            Self::Convolution => &["kernel", "width", "height"],
            Self::Rotation => &["angle"],
            Self::Flip => &["axis"],
            Self::Equalize | Self::GreyScale => &[],
            Self::Scale | Self::ScaleNearestNeighbor => &["width_factor", "height_factor"],
            Self::Shear => &["lambda", "miu"],
            Self::MinFilter | Self::MaxFilter | Self::MedianFilter => &["distance"],
            Self::CropRight | Self::CropBottom => &["removal"],
            Self::AddSalt | Self::AddPepper => &["probability"],
            Self::PrewittEdge
            | Self::SobelEdge
            | Self::LaplacianEdge
            | Self::LaplacianOfGaussianEdge => &["threshold"],
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OperationKind {
    type Err = InvalidOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| InvalidOperation::UnknownKind(s.to_owned()))
    }
}

/// One tagged, parameterized image transformation request.
///
/// Equality is structural: two operations are equal when their kinds
/// and every parameter match.
///
/// Serializes as a flat record with a `kind` tag, e.g.
/// `{"kind":"Linear","gain":1.5,"bias":-10.0}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Operation {
    /// `clamp(v * gain + bias)` on every channel.
    Linear {
        /// Multiplicative factor.
        gain: f64,
        /// Additive offset.
        bias: f64,
    },
    /// `255 * (v / 255)^gamma` on the color channels.
    Power {
        /// Exponent.
        gamma: f64,
    },
    /// Convolve the color channels with a row-major kernel.
    Convolution {
        /// Coefficients, row-major, `width * height` long.
        kernel: Vec<f64>,
        /// Kernel width in taps.
        width: u32,
        /// Kernel height in taps.
        height: u32,
    },
    /// Rotate counter-clockwise, growing the canvas to fit.
    Rotation {
        /// Angle in degrees.
        angle: f64,
    },
    /// Mirror along an axis.
    Flip {
        /// The mirror axis.
        axis: FlipAxis,
    },
    /// Equalize each color channel's histogram.
    Equalize,
    /// Bilinear resize.
    Scale {
        /// Horizontal scale factor.
        width_factor: f64,
        /// Vertical scale factor.
        height_factor: f64,
    },
    /// Nearest-neighbor resize.
    ScaleNearestNeighbor {
        /// Horizontal scale factor.
        width_factor: f64,
        /// Vertical scale factor.
        height_factor: f64,
    },
    /// Shear by the matrix `[[1 + lambda*miu, lambda], [miu, 1]]`.
    Shear {
        /// Horizontal shear coefficient.
        lambda: f64,
        /// Vertical shear coefficient.
        miu: f64,
    },
    /// Minimum over the city-block neighborhood.
    MinFilter {
        /// Neighborhood radius.
        distance: u32,
    },
    /// Maximum over the city-block neighborhood.
    MaxFilter {
        /// Neighborhood radius.
        distance: u32,
    },
    /// Median over the city-block neighborhood.
    MedianFilter {
        /// Neighborhood radius.
        distance: u32,
    },
    /// Convert to luminance.
    GreyScale,
    /// Drop columns from the right edge.
    CropRight {
        /// Number of columns to remove.
        removal: u32,
    },
    /// Drop rows from the bottom edge.
    CropBottom {
        /// Number of rows to remove.
        removal: u32,
    },
    /// Set random pixels to white.
    AddSalt {
        /// Per-pixel probability in `[0, 1]`.
        probability: f64,
    },
    /// Set random pixels to black.
    AddPepper {
        /// Per-pixel probability in `[0, 1]`.
        probability: f64,
    },
    /// Prewitt gradient edge map.
    PrewittEdge {
        /// Gradient magnitude above which a pixel is an edge.
        threshold: f64,
    },
    /// Sobel gradient edge map.
    SobelEdge {
        /// Gradient magnitude above which a pixel is an edge.
        threshold: f64,
    },
    /// Laplacian zero-crossing edge map.
    LaplacianEdge {
        /// Minimum swing across a zero crossing.
        threshold: f64,
    },
    /// Laplacian-of-Gaussian zero-crossing edge map.
    LaplacianOfGaussianEdge {
        /// Minimum swing across a zero crossing.
        threshold: f64,
    },
}

impl Operation {
    /// Build a validated convolution.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidOperation::EmptyKernel`] if either axis is zero and
    /// [`InvalidOperation::KernelSizeMismatch`] if `kernel.len()` is not
    /// `width * height`.
    pub fn convolution(kernel: Vec<f64>, width: u32, height: u32) -> Result<Self, InvalidOperation> {
        let op = Self::Convolution {
            kernel,
            width,
            height,
        };
        op.validate()?;
        Ok(op)
    }

    /// Build an operation from a kind name and an untyped parameter record.
    ///
    /// The record must contain exactly the fields listed by
    /// [`OperationKind::fields`] for that kind.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidOperation::UnknownKind`] for an unrecognized
    /// name, [`InvalidOperation::UnexpectedField`] or
    /// [`InvalidOperation::MissingField`] when the field set is wrong,
    /// [`InvalidOperation::MalformedParameters`] when a value has the
    /// wrong type, and any structural error from [`validate`](Self::validate).
    pub fn from_parts(kind: &str, params: &Map<String, Value>) -> Result<Self, InvalidOperation> {
        let kind: OperationKind = kind.parse()?;
        let fields = kind.fields();

        if let Some(extra) = params.keys().find(|k| !fields.contains(&k.as_str())) {
            return Err(InvalidOperation::UnexpectedField {
                kind,
                field: extra.clone(),
            });
        }
        if let Some(missing) = fields.iter().find(|f| !params.contains_key(**f)) {
            return Err(InvalidOperation::MissingField {
                kind,
                field: *missing,
            });
        }

        let mut record = params.clone();
        record.insert("kind".to_owned(), Value::String(kind.name().to_owned()));
        let op: Self = serde_json::from_value(Value::Object(record)).map_err(|e| {
            InvalidOperation::MalformedParameters {
                kind,
                message: e.to_string(),
            }
        })?;
        op.validate()?;
        Ok(op)
    }

    /// The operation's kind.
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::Linear { .. } => OperationKind::Linear,
            Self::Power { .. } => OperationKind::Power,
            Self::Convolution { .. } => OperationKind::Convolution,
            Self::Rotation { .. } => OperationKind::Rotation,
            Self::Flip { .. } => OperationKind::Flip,
            Self::Equalize => OperationKind::Equalize,
            Self::Scale { .. } => OperationKind::Scale,
            Self::ScaleNearestNeighbor { .. } => OperationKind::ScaleNearestNeighbor,
            Self::Shear { .. } => OperationKind::Shear,
            Self::MinFilter { .. } => OperationKind::MinFilter,
            Self::MaxFilter { .. } => OperationKind::MaxFilter,
            Self::MedianFilter { .. } => OperationKind::MedianFilter,
            Self::GreyScale => OperationKind::GreyScale,
            Self::CropRight { .. } => OperationKind::CropRight,
            Self::CropBottom { .. } => OperationKind::CropBottom,
            Self::AddSalt { .. } => OperationKind::AddSalt,
            Self::AddPepper { .. } => OperationKind::AddPepper,
            Self::PrewittEdge { .. } => OperationKind::PrewittEdge,
            Self::SobelEdge { .. } => OperationKind::SobelEdge,
            Self::LaplacianEdge { .. } => OperationKind::LaplacianEdge,
            Self::LaplacianOfGaussianEdge { .. } => OperationKind::LaplacianOfGaussianEdge,
        }
    }

    /// Check the structural invariants that hold regardless of engine.
    ///
    /// Only convolution carries one today: its coefficient count must
    /// equal `width * height`, and neither axis may be zero.
    ///
    /// # Errors
    ///
    /// Returns the violated invariant as an [`InvalidOperation`].
    pub fn validate(&self) -> Result<(), InvalidOperation> {
        if let Self::Convolution {
            kernel,
            width,
            height,
        } = self
        {
            if *width == 0 || *height == 0 {
                return Err(InvalidOperation::EmptyKernel);
            }
            let expected = u64::from(*width) * u64::from(*height);
            if u64::try_from(kernel.len()).ok() != Some(expected) {
                return Err(InvalidOperation::KernelSizeMismatch {
                    len: kernel.len(),
                    width: *width,
                    height: *height,
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.kind();
        match self {
            Self::Linear { gain, bias } => write!(f, "{kind}(gain={gain}, bias={bias})"),
            Self::Power { gamma } => write!(f, "{kind}(gamma={gamma})"),
            Self::Convolution { width, height, .. } => write!(f, "{kind}({width}x{height})"),
            Self::Rotation { angle } => write!(f, "{kind}(angle={angle})"),
            Self::Flip { axis } => write!(f, "{kind}(axis={axis})"),
            Self::Equalize | Self::GreyScale => write!(f, "{kind}"),
            Self::Scale {
                width_factor,
                height_factor,
            }
            | Self::ScaleNearestNeighbor {
                width_factor,
                height_factor,
            } => write!(f, "{kind}({width_factor}, {height_factor})"),
            Self::Shear { lambda, miu } => write!(f, "{kind}(lambda={lambda}, miu={miu})"),
            Self::MinFilter { distance }
            | Self::MaxFilter { distance }
            | Self::MedianFilter { distance } => write!(f, "{kind}(distance={distance})"),
            Self::CropRight { removal } | Self::CropBottom { removal } => {
                write!(f, "{kind}(removal={removal})")
            }
            Self::AddSalt { probability } | Self::AddPepper { probability } => {
                write!(f, "{kind}(p={probability})")
            }
            Self::PrewittEdge { threshold }
            | Self::SobelEdge { threshold }
            | Self::LaplacianEdge { threshold }
            | Self::LaplacianOfGaussianEdge { threshold } => {
                write!(f, "{kind}(threshold={threshold})")
            }
        }
    }
}
