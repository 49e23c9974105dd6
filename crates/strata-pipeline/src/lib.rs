//! strata-pipeline: replayable image-operation pipelines (sans-IO).
//!
//! An edit session is a base image plus an ordered log of operations.
//! The displayed image is always the left fold of the log over the base:
//!
//! ```text
//! output = opN( .. op2( op1( base ) ) .. )
//! ```
//!
//! Nothing is edited in place, so undo is just popping the last
//! operation and replaying, and swapping the base image replays the whole
//! log over the new picture.
//!
//! - [`operation`]: the closed set of operations and their parameters.
//! - [`operation_log`]: the ordered log with LIFO undo.
//! - [`engine`]: the [`Engine`] trait, one pure function per operation
//!   kind, and the default [`ImageEngine`].
//! - [`evaluate()`]: the fold.
//! - [`store`]: [`PipelineStore`], which keeps base, log, and output
//!   consistent and tags off-thread evaluations by revision.
//!
//! This crate has **no I/O dependencies**: images arrive and leave as
//! in-memory [`RgbaImage`] buffers. Decoding and encoding live in
//! `strata-cli`.

pub mod diagnostics;
pub mod edge;
pub mod engine;
pub mod evaluate;
pub mod filter;
pub mod geometry;
pub mod histogram;
pub mod operation;
pub mod operation_log;
pub mod point;
pub mod store;
pub mod types;
pub mod worker;

pub use diagnostics::{Clock, EvaluationDiagnostics, WebClock, evaluate_with_diagnostics};
pub use engine::{Engine, EngineConfig, ImageEngine, Interpolation};
pub use evaluate::{StagedEvaluation, evaluate, evaluate_staged};
pub use operation::{FlipAxis, Operation, OperationKind};
pub use operation_log::OperationLog;
pub use store::{
    Completion, EvaluationRequest, EvaluationResponse, PipelineState, PipelineStore, ReEvaluation,
};
pub use types::{Dimensions, EngineError, Image, InvalidOperation, PipelineError, RgbaImage};
pub use worker::{EvaluationWorker, WorkerError};
