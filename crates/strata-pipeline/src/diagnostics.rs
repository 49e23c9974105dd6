//! Evaluation diagnostics: per-step timing and image dimensions.
//!
//! [`evaluate_with_diagnostics`] runs the same fold as
//! [`evaluate`](crate::evaluate::evaluate) and records, for every step,
//! how long the engine took and how the image size changed. This is the
//! instrument for finding which operation in a long log dominates the
//! re-evaluation cost.
//!
//! Time is read through the [`Clock`] trait so callers choose the time
//! source. [`WebClock`] uses the `web-time` crate, which is
//! `performance.now()` on WASM and `std::time::Instant` on native.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::evaluate::fold;
use crate::operation::{Operation, OperationKind};
use crate::types::{Dimensions, Image, PipelineError};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// A monotonic time source.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// The current instant.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// [`Clock`] backed by [`web_time::Instant`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WebClock;

impl Clock for WebClock {
    type Instant = web_time::Instant;

    fn now(&self) -> Self::Instant {
        web_time::Instant::now()
    }

    fn elapsed(&self, since: &Self::Instant) -> Duration {
        since.elapsed()
    }
}

/// Diagnostics for one evaluation of an operation sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationDiagnostics {
    /// Dimensions of the base image the fold started from.
    pub base: Dimensions,
    /// One entry per operation, in application order.
    pub steps: Vec<StepDiagnostics>,
    /// Wall-clock duration of the whole fold (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
}

/// Diagnostics for a single step of the fold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDiagnostics {
    /// Zero-based position in the operation sequence.
    pub index: usize,
    /// Which operation ran.
    pub kind: OperationKind,
    /// Input image size.
    pub input: Dimensions,
    /// Output image size.
    pub output: Dimensions,
    /// Wall-clock duration of this step (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

impl EvaluationDiagnostics {
    /// The step that took longest, if any ran.
    #[must_use]
    pub fn slowest_step(&self) -> Option<&StepDiagnostics> {
        self.steps.iter().max_by_key(|s| s.duration)
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Evaluation Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Base image: {} ({} pixels)",
            self.base,
            self.base.pixel_count(),
        ));
        lines.push(format!(
            "Steps: {}  |  Total duration: {:.3}ms",
            self.steps.len(),
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<4} {:<24} {:>12} {:>12} {:>10} {:>8}",
            "#", "Operation", "Input", "Output", "Duration", "% Total"
        ));
        lines.push("-".repeat(76));

        let total_ms = duration_ms(self.total_duration);
        for step in &self.steps {
            let ms = duration_ms(step.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            lines.push(format!(
                "{:<4} {:<24} {:>12} {:>12} {ms:>8.3}ms {pct:>7.1}%",
                step.index,
                step.kind.name(),
                step.input.to_string(),
                step.output.to_string(),
            ));
        }

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Evaluate `operations` over `base`, timing each step with `clock`.
///
/// Produces exactly the image [`evaluate`](crate::evaluate::evaluate)
/// would.
///
/// # Errors
///
/// Returns [`PipelineError::Evaluation`] naming the first failing step.
/// No diagnostics are returned for a failed run.
pub fn evaluate_with_diagnostics<E, C>(
    engine: &E,
    base: &Arc<Image>,
    operations: &[Operation],
    clock: &C,
) -> Result<(Arc<Image>, EvaluationDiagnostics), PipelineError>
where
    E: Engine + ?Sized,
    C: Clock,
{
    let start = clock.now();
    let mut step_start = clock.now();
    let mut input = Dimensions::of(base);
    let mut steps = Vec::with_capacity(operations.len());

    let output = fold(engine, base, operations, |index, operation, image| {
        let output = Dimensions::of(image);
        steps.push(StepDiagnostics {
            index,
            kind: operation.kind(),
            input,
            output,
            duration: clock.elapsed(&step_start),
        });
        input = output;
        step_start = clock.now();
    })?;

    let diagnostics = EvaluationDiagnostics {
        base: Dimensions::of(base),
        steps,
        total_duration: clock.elapsed(&start),
    };
    Ok((output, diagnostics))
}
