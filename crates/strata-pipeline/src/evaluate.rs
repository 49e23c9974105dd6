//! The evaluator: a strict left fold of an operation sequence over a base
//! image.
//!
//! `evaluate(base, [op1, .., opN]) = opN(..op1(base)..)`. Operations are
//! applied one at a time, in order, each receiving exactly the previous
//! step's output. The first failure aborts the fold; no partial result
//! escapes.

use std::sync::Arc;

use crate::engine::Engine;
use crate::operation::Operation;
use crate::types::{Image, PipelineError};

/// Fold `operations` over `base`, calling `on_step` after each step with
/// the step's index, operation, and output.
pub(crate) fn fold<E, F>(
    engine: &E,
    base: &Arc<Image>,
    operations: &[Operation],
    mut on_step: F,
) -> Result<Arc<Image>, PipelineError>
where
    E: Engine + ?Sized,
    F: FnMut(usize, &Operation, &Arc<Image>),
{
    let mut current = Arc::clone(base);
    for (index, operation) in operations.iter().enumerate() {
        let next = engine.apply(&current, operation).map_err(|cause| {
            log::warn!("step {index} ({operation}) failed: {cause}");
            PipelineError::Evaluation {
                at_index: index,
                cause,
            }
        })?;
        log::debug!(
            "step {index}: {operation} {}x{} -> {}x{}",
            current.width(),
            current.height(),
            next.width(),
            next.height(),
        );
        current = Arc::new(next);
        on_step(index, operation, &current);
    }
    Ok(current)
}

/// Apply `operations` to `base` in order and return the final image.
///
/// An empty sequence returns `base` itself (the same allocation). The
/// base image is never modified.
///
/// # Errors
///
/// Returns [`PipelineError::Evaluation`] with the zero-based index of the
/// first step the engine rejected.
pub fn evaluate<E: Engine + ?Sized>(
    engine: &E,
    base: &Arc<Image>,
    operations: &[Operation],
) -> Result<Arc<Image>, PipelineError> {
    fold(engine, base, operations, |_, _, _| {})
}

/// Every cumulative result of a staged evaluation.
///
/// `stages[i]` is the image after applying `operations[..=i]`, so a UI
/// can show the effect of each edit without re-running the prefix.
#[derive(Debug, Clone)]
pub struct StagedEvaluation {
    /// The image the fold started from.
    pub base: Arc<Image>,
    /// One image per operation, in application order.
    pub stages: Vec<Arc<Image>>,
}

impl StagedEvaluation {
    /// The final image: the last stage, or the base if there were no
    /// operations.
    #[must_use]
    pub fn output(&self) -> &Arc<Image> {
        self.stages.last().unwrap_or(&self.base)
    }

    /// The image after `count` operations (`0` is the base).
    #[must_use]
    pub fn after(&self, count: usize) -> Option<&Arc<Image>> {
        match count {
            0 => Some(&self.base),
            n => self.stages.get(n - 1),
        }
    }
}

/// Like [`evaluate`], but keep every intermediate image.
///
/// # Errors
///
/// Returns [`PipelineError::Evaluation`] with the zero-based index of the
/// first step the engine rejected.
pub fn evaluate_staged<E: Engine + ?Sized>(
    engine: &E,
    base: &Arc<Image>,
    operations: &[Operation],
) -> Result<StagedEvaluation, PipelineError> {
    let mut stages = Vec::with_capacity(operations.len());
    fold(engine, base, operations, |_, _, image| {
        stages.push(Arc::clone(image));
    })?;
    Ok(StagedEvaluation {
        base: Arc::clone(base),
        stages,
    })
}
