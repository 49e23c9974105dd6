//! The pipeline store: base image, operation log, and the cached output,
//! kept consistent by a small state machine.
//!
//! | state     | `set_base_image` | `append_operation` | `remove_last_operation`        | evaluation ok |
//! |-----------|------------------|--------------------|--------------------------------|---------------|
//! | Empty     | Ready            | Empty              | Empty                          |               |
//! | Ready     | Ready            | Stale              | Stale, or Ready if log empties | Evaluated     |
//! | Stale     | Ready            | Stale              | Stale, or Ready if log empties | Evaluated     |
//! | Evaluated | Ready            | Stale              | Stale, or Ready if log empties |               |
//!
//! Evaluation can run in place ([`PipelineStore::re_evaluate`]) or be
//! offloaded: [`PipelineStore::request_evaluation`] hands out a
//! self-contained [`EvaluationRequest`] tagged with the store's current
//! revision, and [`PipelineStore::complete_evaluation`] accepts the
//! response only if no mutation happened in between. Results computed
//! against an out-of-date log are discarded, never displayed.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::engine::{Engine, ImageEngine};
use crate::evaluate::evaluate;
use crate::operation::Operation;
use crate::operation_log::OperationLog;
use crate::types::{Image, PipelineError};

/// Where the store is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineState {
    /// No base image yet. Operations may still be queued.
    Empty,
    /// A base image is set and the output shows it unmodified.
    Ready,
    /// The log changed since the output was computed.
    Stale,
    /// The output equals `evaluate(base, log)`.
    Evaluated,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Ready => f.write_str("Ready"),
            Self::Stale => f.write_str("Stale"),
            Self::Evaluated => f.write_str("Evaluated"),
        }
    }
}

/// Successful outcome of [`PipelineStore::re_evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReEvaluation {
    /// The log was folded over the base and the output replaced.
    Evaluated,
    /// The output was already current; nothing ran.
    UpToDate,
    /// There is no base image to evaluate against; nothing ran.
    NoBaseImage,
}

/// A self-contained unit of evaluation work, safe to send to another
/// thread.
///
/// Holds its own snapshot of the log, so later edits to the store cannot
/// change what it computes.
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    /// Store revision the snapshot was taken at.
    pub revision: u64,
    /// The base image.
    pub base: Arc<Image>,
    /// The operation sequence at `revision`.
    pub operations: Arc<[Operation]>,
}

impl EvaluationRequest {
    /// Run the evaluation with `engine`.
    #[must_use]
    pub fn run<E: Engine + ?Sized>(&self, engine: &E) -> EvaluationResponse {
        EvaluationResponse {
            revision: self.revision,
            result: evaluate(engine, &self.base, &self.operations),
        }
    }
}

/// The result of an [`EvaluationRequest`], tagged with its revision.
#[derive(Debug, Clone)]
pub struct EvaluationResponse {
    /// Revision of the request that produced this response.
    pub revision: u64,
    /// The evaluated image, or the step that failed.
    pub result: Result<Arc<Image>, PipelineError>,
}

/// What [`PipelineStore::complete_evaluation`] did with a response.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// The response matched the current revision and became the output.
    Applied,
    /// The store changed after the request was issued; the response was
    /// dropped.
    Discarded,
    /// The response was current but the evaluation failed. The output
    /// keeps its previous value and the store stays stale.
    Failed(PipelineError),
}

/// Owns the base image, the operation log, and the last computed output.
///
/// Every mutation bumps [`revision`](Self::revision), which tags
/// offloaded evaluation requests so stale results can be recognized.
#[derive(Debug, Clone)]
pub struct PipelineStore<E = ImageEngine> {
    engine: E,
    base: Option<Arc<Image>>,
    log: OperationLog,
    output: Option<Arc<Image>>,
    state: PipelineState,
    revision: u64,
}

impl Default for PipelineStore {
    fn default() -> Self {
        Self::new(ImageEngine::default())
    }
}

impl<E: Engine> PipelineStore<E> {
    /// An empty store that evaluates with `engine`.
    #[must_use]
    pub const fn new(engine: E) -> Self {
        Self {
            engine,
            base: None,
            log: OperationLog::new(),
            output: None,
            state: PipelineState::Empty,
            revision: 0,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> PipelineState {
        self.state
    }

    /// Monotonic counter bumped by every mutation.
    #[must_use]
    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// The engine used for evaluation.
    #[must_use]
    pub const fn engine(&self) -> &E {
        &self.engine
    }

    /// Read-only view of the operation log.
    #[must_use]
    pub const fn log(&self) -> &OperationLog {
        &self.log
    }

    /// An owned snapshot of the operations, in application order.
    #[must_use]
    pub fn operations(&self) -> Arc<[Operation]> {
        self.log.to_sequence()
    }

    /// The image to display: the base in `Ready`, the evaluated result in
    /// `Evaluated`, and the last good output in `Stale`. `None` until a
    /// base image is set.
    #[must_use]
    pub fn output(&self) -> Option<&Arc<Image>> {
        self.output.as_ref()
    }

    /// Returns `true` once a base image has been set.
    #[must_use]
    pub const fn has_base_image(&self) -> bool {
        self.base.is_some()
    }

    /// Returns `true` if the output does not yet reflect the log.
    #[must_use]
    pub const fn needs_evaluation(&self) -> bool {
        match self.state {
            PipelineState::Stale => true,
            PipelineState::Ready => !self.log.is_empty(),
            PipelineState::Empty | PipelineState::Evaluated => false,
        }
    }

    fn transition(&mut self, next: PipelineState) {
        self.revision += 1;
        if self.state != next {
            log::debug!("store r{}: {} -> {next}", self.revision, self.state);
        }
        self.state = next;
    }

    /// Replace the base image.
    ///
    /// The log is kept: existing operations will be replayed over the new
    /// base on the next evaluation. Until then the output shows the new
    /// base unmodified.
    pub fn set_base_image(&mut self, image: Image) {
        let base = Arc::new(image);
        log::debug!(
            "base image set: {}x{}, {} queued operations",
            base.width(),
            base.height(),
            self.log.len()
        );
        self.output = Some(Arc::clone(&base));
        self.base = Some(base);
        self.transition(PipelineState::Ready);
    }

    /// Validate and append an operation.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidOperation`] if the operation's
    /// parameters are inconsistent. The store is unchanged in that case.
    pub fn append_operation(&mut self, operation: Operation) -> Result<(), PipelineError> {
        operation.validate()?;
        self.log.append(operation);
        let next = match self.state {
            PipelineState::Empty => PipelineState::Empty,
            PipelineState::Ready | PipelineState::Stale | PipelineState::Evaluated => {
                PipelineState::Stale
            }
        };
        self.transition(next);
        Ok(())
    }

    /// Undo the most recent operation.
    ///
    /// Returns `false`, leaving the store untouched, if the log was
    /// already empty. Removing the last remaining operation returns the
    /// store to `Ready` with the base image as output.
    pub fn remove_last_operation(&mut self) -> bool {
        if !self.log.remove_last() {
            return false;
        }
        let next = match self.state {
            PipelineState::Empty => PipelineState::Empty,
            _ if self.log.is_empty() => {
                self.output.clone_from(&self.base);
                PipelineState::Ready
            }
            _ => PipelineState::Stale,
        };
        self.transition(next);
        true
    }

    /// Bring the output up to date by folding the log over the base.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Evaluation`] if a step fails. The output
    /// keeps its previous value and the store is left `Stale`.
    pub fn re_evaluate(&mut self) -> Result<ReEvaluation, PipelineError> {
        if !self.needs_evaluation() {
            return Ok(match self.state {
                PipelineState::Empty => ReEvaluation::NoBaseImage,
                _ => ReEvaluation::UpToDate,
            });
        }
        let Some(request) = self.request_evaluation() else {
            return Ok(ReEvaluation::NoBaseImage);
        };
        let response = request.run(&self.engine);
        self.accept(response.result)?;
        Ok(ReEvaluation::Evaluated)
    }

    /// Snapshot the work needed to bring the output up to date, or `None`
    /// if the output is already current or there is no base image.
    ///
    /// The store itself does not change; the request can be run on any
    /// thread and its response handed to
    /// [`complete_evaluation`](Self::complete_evaluation).
    #[must_use]
    pub fn request_evaluation(&self) -> Option<EvaluationRequest> {
        if !self.needs_evaluation() {
            return None;
        }
        let base = self.base.as_ref()?;
        log::debug!(
            "evaluation requested at r{} ({} operations)",
            self.revision,
            self.log.len()
        );
        Some(EvaluationRequest {
            revision: self.revision,
            base: Arc::clone(base),
            operations: self.log.to_sequence(),
        })
    }

    /// Accept the result of an evaluation request.
    ///
    /// Responses for an older revision are discarded: the log or base
    /// changed after the request was issued, so the result no longer
    /// describes the store.
    pub fn complete_evaluation(&mut self, response: EvaluationResponse) -> Completion {
        if response.revision != self.revision {
            log::debug!(
                "discarding stale evaluation r{} (store at r{})",
                response.revision,
                self.revision
            );
            return Completion::Discarded;
        }
        match self.accept(response.result) {
            Ok(()) => Completion::Applied,
            Err(err) => Completion::Failed(err),
        }
    }

    /// Install a result computed at the current revision.
    fn accept(&mut self, result: Result<Arc<Image>, PipelineError>) -> Result<(), PipelineError> {
        match result {
            Ok(image) => {
                self.output = Some(image);
                if self.state != PipelineState::Evaluated {
                    log::debug!("store r{}: {} -> Evaluated", self.revision, self.state);
                }
                self.state = PipelineState::Evaluated;
                Ok(())
            }
            Err(err) => {
                self.state = PipelineState::Stale;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::Rgba;

    use super::*;
    use crate::operation::FlipAxis;
    use crate::types::{EngineError, InvalidOperation};

    fn image(width: u32, height: u32) -> Image {
        Image::from_fn(width, height, |x, y| {
            Rgba([u8::try_from(x).unwrap(), u8::try_from(y).unwrap(), 9, 255])
        })
    }

    fn ready_store() -> PipelineStore {
        let mut store = PipelineStore::default();
        store.set_base_image(image(10, 10));
        store
    }

    #[test]
    fn new_store_is_empty() {
        let store = PipelineStore::default();
        assert_eq!(store.state(), PipelineState::Empty);
        assert!(store.output().is_none());
        assert!(!store.needs_evaluation());
        assert!(!store.has_base_image());
    }

    #[test]
    fn set_base_image_shows_base() {
        let store = ready_store();
        assert_eq!(store.state(), PipelineState::Ready);
        assert_eq!(**store.output().unwrap(), image(10, 10));
        assert!(!store.needs_evaluation());
    }

    #[test]
    fn append_in_empty_stays_empty_then_replays() {
        let mut store = PipelineStore::default();
        store
            .append_operation(Operation::CropRight { removal: 3 })
            .unwrap();
        assert_eq!(store.state(), PipelineState::Empty);
        assert_eq!(store.re_evaluate().unwrap(), ReEvaluation::NoBaseImage);

        store.set_base_image(image(10, 10));
        assert_eq!(store.state(), PipelineState::Ready);
        assert!(store.needs_evaluation());
        assert_eq!(store.re_evaluate().unwrap(), ReEvaluation::Evaluated);
        assert_eq!(store.output().unwrap().dimensions(), (7, 10));
    }

    #[test]
    fn append_marks_stale_and_evaluate_clears() {
        let mut store = ready_store();
        store
            .append_operation(Operation::Flip { axis: FlipAxis::Y })
            .unwrap();
        assert_eq!(store.state(), PipelineState::Stale);
        assert_eq!(**store.output().unwrap(), image(10, 10));

        assert_eq!(store.re_evaluate().unwrap(), ReEvaluation::Evaluated);
        assert_eq!(store.state(), PipelineState::Evaluated);
        assert_eq!(store.output().unwrap().get_pixel(0, 0).0[0], 9);
        assert_eq!(store.re_evaluate().unwrap(), ReEvaluation::UpToDate);
    }

    #[test]
    fn invalid_operation_leaves_store_untouched() {
        let mut store = ready_store();
        let revision = store.revision();
        let bad = Operation::Convolution {
            kernel: vec![1.0; 8],
            width: 3,
            height: 3,
        };
        let err = store.append_operation(bad).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvalidOperation(InvalidOperation::KernelSizeMismatch { .. })
        ));
        assert!(store.log().is_empty());
        assert_eq!(store.state(), PipelineState::Ready);
        assert_eq!(store.revision(), revision);
    }

    #[test]
    fn removing_only_operation_returns_to_ready() {
        let mut store = ready_store();
        store.append_operation(Operation::GreyScale).unwrap();
        store.re_evaluate().unwrap();
        assert!(store.remove_last_operation());
        assert_eq!(store.state(), PipelineState::Ready);
        assert_eq!(**store.output().unwrap(), image(10, 10));
    }

    #[test]
    fn removing_with_operations_left_is_stale() {
        let mut store = ready_store();
        store.append_operation(Operation::GreyScale).unwrap();
        store.append_operation(Operation::Equalize).unwrap();
        store.re_evaluate().unwrap();
        assert!(store.remove_last_operation());
        assert_eq!(store.state(), PipelineState::Stale);
    }

    #[test]
    fn remove_on_empty_log_is_noop() {
        let mut store = ready_store();
        let revision = store.revision();
        assert!(!store.remove_last_operation());
        assert_eq!(store.state(), PipelineState::Ready);
        assert_eq!(store.revision(), revision);
    }

    #[test]
    fn failed_evaluation_keeps_previous_output() {
        let mut store = ready_store();
        store
            .append_operation(Operation::CropRight { removal: 4 })
            .unwrap();
        store.re_evaluate().unwrap();
        let good = Arc::clone(store.output().unwrap());

        store
            .append_operation(Operation::CropBottom { removal: 10 })
            .unwrap();
        store
            .append_operation(Operation::Rotation { angle: 15.0 })
            .unwrap();
        let err = store.re_evaluate().unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Evaluation {
                at_index: 2,
                cause: EngineError::EmptyImage { .. },
            }
        ));
        assert_eq!(store.state(), PipelineState::Stale);
        assert!(Arc::ptr_eq(store.output().unwrap(), &good));
        assert_eq!(store.log().len(), 3);
    }

    #[test]
    fn stale_response_is_discarded() {
        let mut store = ready_store();
        store
            .append_operation(Operation::CropRight { removal: 1 })
            .unwrap();
        let first = store.request_evaluation().unwrap();

        store
            .append_operation(Operation::CropRight { removal: 1 })
            .unwrap();
        let second = store.request_evaluation().unwrap();
        assert!(second.revision > first.revision);

        let engine = ImageEngine::default();
        let second_response = second.run(&engine);
        let first_response = first.run(&engine);

        assert_eq!(store.complete_evaluation(second_response), Completion::Applied);
        assert_eq!(store.complete_evaluation(first_response), Completion::Discarded);
        assert_eq!(store.output().unwrap().dimensions(), (8, 10));
        assert_eq!(store.state(), PipelineState::Evaluated);
    }

    #[test]
    fn request_is_none_when_current() {
        let mut store = ready_store();
        assert!(store.request_evaluation().is_none());
        store.append_operation(Operation::Equalize).unwrap();
        assert!(store.request_evaluation().is_some());
        store.re_evaluate().unwrap();
        assert!(store.request_evaluation().is_none());
    }

    #[test]
    fn new_base_replays_log() {
        let mut store = ready_store();
        store
            .append_operation(Operation::CropBottom { removal: 2 })
            .unwrap();
        store.re_evaluate().unwrap();
        assert_eq!(store.output().unwrap().dimensions(), (10, 8));

        store.set_base_image(image(20, 6));
        assert_eq!(store.state(), PipelineState::Ready);
        assert_eq!(store.output().unwrap().dimensions(), (20, 6));
        store.re_evaluate().unwrap();
        assert_eq!(store.output().unwrap().dimensions(), (20, 4));
    }
}
