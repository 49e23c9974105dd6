//! Integration tests: drive the store end to end, with the real engine
//! and with an instrumented engine that counts calls and injects failures.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Map, Value, json};
use strata_pipeline::{
    Completion, Engine, EngineError, EvaluationWorker, FlipAxis, Image, ImageEngine, InvalidOperation, Operation,
    OperationKind, PipelineError, PipelineState, PipelineStore, ReEvaluation, evaluate,
};

fn black(width: u32, height: u32) -> Image {
    Image::from_pixel(width, height, image::Rgba([0, 0, 0, 255]))
}

fn gradient(width: u32, height: u32) -> Image {
    Image::from_fn(width, height, |x, y| {
        let v = u8::try_from((x * 13 + y * 7) % 256).unwrap();
        image::Rgba([v, 255 - v, v / 3, 255])
    })
}

fn params(value: &Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

/// Delegates to [`ImageEngine`], counting calls and optionally failing
/// every step of one kind.
#[derive(Default)]
struct Instrumented {
    inner: ImageEngine,
    calls: AtomicUsize,
    fail_on: Option<OperationKind>,
}

impl Instrumented {
    fn failing_on(kind: OperationKind) -> Self {
        Self {
            fail_on: Some(kind),
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check(&self, kind: OperationKind) -> Result<(), EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on == Some(kind) {
            return Err(EngineError::InvalidParameter {
                kind,
                name: "injected",
                value: 0.0,
                reason: "injected failure",
            });
        }
        Ok(())
    }
}

macro_rules! delegate {
    ($($method:ident => $kind:ident($($arg:ident: $ty:ty),*);)*) => {
        $(
            fn $method(&self, image: &Image, $($arg: $ty),*) -> Result<Image, EngineError> {
                self.check(OperationKind::$kind)?;
                self.inner.$method(image, $($arg),*)
            }
        )*
    };
}

impl Engine for Instrumented {
    delegate! {
        linear => Linear(gain: f64, bias: f64);
        power => Power(gamma: f64);
        convolution => Convolution(kernel: &[f64], width: u32, height: u32);
        rotation => Rotation(angle: f64);
        flip => Flip(axis: FlipAxis);
        equalize => Equalize();
        scale => Scale(width_factor: f64, height_factor: f64);
        scale_nearest_neighbor => ScaleNearestNeighbor(width_factor: f64, height_factor: f64);
        shear => Shear(lambda: f64, miu: f64);
        min_filter => MinFilter(distance: u32);
        max_filter => MaxFilter(distance: u32);
        median_filter => MedianFilter(distance: u32);
        grey_scale => GreyScale();
        crop_right => CropRight(removal: u32);
        crop_bottom => CropBottom(removal: u32);
        add_salt => AddSalt(probability: f64);
        add_pepper => AddPepper(probability: f64);
        prewitt_edge => PrewittEdge(threshold: f64);
        sobel_edge => SobelEdge(threshold: f64);
        laplacian_edge => LaplacianEdge(threshold: f64);
        laplacian_of_gaussian_edge => LaplacianOfGaussianEdge(threshold: f64);
    }
}

/// Delegates to [`ImageEngine`], but the first `GreyScale` step signals
/// `entered` and then blocks until `release` fires.
struct Gated {
    inner: ImageEngine,
    entered: Mutex<Option<Sender<()>>>,
    release: Mutex<Receiver<()>>,
}

impl Gated {
    fn new() -> (Self, Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let engine = Self {
            inner: ImageEngine::default(),
            entered: Mutex::new(Some(entered_tx)),
            release: Mutex::new(release_rx),
        };
        (engine, entered_rx, release_tx)
    }

    fn check(&self, kind: OperationKind) -> Result<(), EngineError> {
        if kind == OperationKind::GreyScale {
            let first = self.entered.lock().unwrap().take();
            if let Some(entered) = first {
                entered.send(()).unwrap();
                self.release.lock().unwrap().recv().unwrap();
            }
        }
        Ok(())
    }
}

impl Engine for Gated {
    delegate! {
        linear => Linear(gain: f64, bias: f64);
        power => Power(gamma: f64);
        convolution => Convolution(kernel: &[f64], width: u32, height: u32);
        rotation => Rotation(angle: f64);
        flip => Flip(axis: FlipAxis);
        equalize => Equalize();
        scale => Scale(width_factor: f64, height_factor: f64);
        scale_nearest_neighbor => ScaleNearestNeighbor(width_factor: f64, height_factor: f64);
        shear => Shear(lambda: f64, miu: f64);
        min_filter => MinFilter(distance: u32);
        max_filter => MaxFilter(distance: u32);
        median_filter => MedianFilter(distance: u32);
        grey_scale => GreyScale();
        crop_right => CropRight(removal: u32);
        crop_bottom => CropBottom(removal: u32);
        add_salt => AddSalt(probability: f64);
        add_pepper => AddPepper(probability: f64);
        prewitt_edge => PrewittEdge(threshold: f64);
        sobel_edge => SobelEdge(threshold: f64);
        laplacian_edge => LaplacianEdge(threshold: f64);
        laplacian_of_gaussian_edge => LaplacianOfGaussianEdge(threshold: f64);
    }
}

#[test]
fn identity_law() {
    let base = Arc::new(gradient(9, 5));
    let out = evaluate(&ImageEngine::default(), &base, &[]).unwrap();
    assert_eq!(*out, *base);
}

#[test]
fn evaluation_is_deterministic() {
    let base = Arc::new(gradient(16, 12));
    let ops = [
        Operation::AddSalt { probability: 0.2 },
        Operation::Rotation { angle: 33.0 },
        Operation::MedianFilter { distance: 1 },
        Operation::AddPepper { probability: 0.1 },
        Operation::SobelEdge { threshold: 60.0 },
    ];
    let engine = ImageEngine::default();
    let a = evaluate(&engine, &base, &ops).unwrap();
    let b = evaluate(&engine, &base, &ops).unwrap();
    assert_eq!(a.as_raw(), b.as_raw());
}

#[test]
fn append_then_remove_is_inverse() {
    let mut store = PipelineStore::default();
    store.set_base_image(gradient(8, 8));
    store.append_operation(Operation::GreyScale).unwrap();
    let before = store.operations();

    store
        .append_operation(Operation::Shear {
            lambda: 0.3,
            miu: 0.0,
        })
        .unwrap();
    assert!(store.remove_last_operation());
    assert_eq!(store.operations(), before);
}

#[test]
fn remove_from_empty_log_is_noop() {
    let mut store = PipelineStore::default();
    assert!(!store.remove_last_operation());
    store.set_base_image(black(2, 2));
    assert!(!store.remove_last_operation());
    assert_eq!(store.state(), PipelineState::Ready);
}

#[test]
fn mismatched_kernel_is_rejected_at_append() {
    let mut store = PipelineStore::default();
    store.set_base_image(black(4, 4));
    store.append_operation(Operation::Equalize).unwrap();
    let len = store.log().len();

    let err = store
        .append_operation(Operation::Convolution {
            kernel: vec![0.0; 5],
            width: 2,
            height: 2,
        })
        .unwrap_err();
    assert_eq!(
        err,
        PipelineError::InvalidOperation(InvalidOperation::KernelSizeMismatch {
            len: 5,
            width: 2,
            height: 2,
        })
    );
    assert_eq!(store.log().len(), len);
}

#[test]
fn scenario_a_grey_then_flip_black_image() {
    let mut store = PipelineStore::default();
    store.set_base_image(black(10, 10));
    store.append_operation(Operation::GreyScale).unwrap();
    store
        .append_operation(Operation::Flip { axis: FlipAxis::X })
        .unwrap();
    assert_eq!(store.re_evaluate().unwrap(), ReEvaluation::Evaluated);
    assert_eq!(**store.output().unwrap(), black(10, 10));
}

#[test]
fn scenario_b_crops_change_dimensions_between_steps() {
    let mut store = PipelineStore::default();
    store.set_base_image(gradient(10, 10));
    store
        .append_operation(Operation::CropRight { removal: 2 })
        .unwrap();
    store
        .append_operation(Operation::CropBottom { removal: 3 })
        .unwrap();
    store.re_evaluate().unwrap();
    assert_eq!(store.output().unwrap().dimensions(), (8, 7));
}

#[test]
fn scenario_c_undo_then_redo_with_new_parameters() {
    let base = gradient(12, 7);
    let mut store = PipelineStore::default();
    store.set_base_image(base.clone());

    let rotate_90 = Operation::from_parts("Rotation", &params(&json!({"angle": 90.0}))).unwrap();
    let rotate_45 = Operation::from_parts("Rotation", &params(&json!({"angle": 45.0}))).unwrap();

    store.append_operation(rotate_90).unwrap();
    assert!(store.remove_last_operation());
    store.append_operation(rotate_45).unwrap();
    store.re_evaluate().unwrap();

    let direct = evaluate(
        &ImageEngine::default(),
        &Arc::new(base),
        &[Operation::Rotation { angle: 45.0 }],
    )
    .unwrap();
    assert_eq!(**store.output().unwrap(), *direct);
}

#[test]
fn scenario_d_last_issued_wins_over_last_completed() {
    let engine = ImageEngine::default();
    let mut store = PipelineStore::default();
    store.set_base_image(gradient(10, 10));

    store
        .append_operation(Operation::CropRight { removal: 1 })
        .unwrap();
    let older = store.request_evaluation().unwrap();

    store
        .append_operation(Operation::CropBottom { removal: 5 })
        .unwrap();
    let newer = store.request_evaluation().unwrap();

    // The newer request finishes first, then the older one straggles in.
    assert_eq!(store.complete_evaluation(newer.run(&engine)), Completion::Applied);
    assert_eq!(store.complete_evaluation(older.run(&engine)), Completion::Discarded);

    assert_eq!(store.state(), PipelineState::Evaluated);
    assert_eq!(store.output().unwrap().dimensions(), (9, 5));
}

#[test]
fn scenario_d_older_completion_never_applies_after_edit() {
    let engine = ImageEngine::default();
    let mut store = PipelineStore::default();
    store.set_base_image(gradient(10, 10));
    store
        .append_operation(Operation::CropRight { removal: 1 })
        .unwrap();
    let older = store.request_evaluation().unwrap();
    store
        .append_operation(Operation::CropBottom { removal: 5 })
        .unwrap();

    // The older request completes while the newer one is still pending.
    assert_eq!(store.complete_evaluation(older.run(&engine)), Completion::Discarded);
    assert_eq!(store.state(), PipelineState::Stale);
    assert_eq!(store.output().unwrap().dimensions(), (10, 10));
    assert!(store.needs_evaluation());
}

#[test]
fn only_re_evaluate_invokes_the_engine() {
    let mut store = PipelineStore::new(Instrumented::default());
    store.set_base_image(gradient(6, 6));
    store.append_operation(Operation::GreyScale).unwrap();
    store.append_operation(Operation::Equalize).unwrap();
    store.remove_last_operation();
    store.append_operation(Operation::Power { gamma: 2.0 }).unwrap();
    assert_eq!(store.engine().calls(), 0);

    store.re_evaluate().unwrap();
    assert_eq!(store.engine().calls(), 2);

    store.re_evaluate().unwrap();
    assert_eq!(store.engine().calls(), 2, "up-to-date output must not re-run");
}

#[test]
fn failed_step_is_atomic() {
    let mut store = PipelineStore::new(Instrumented::failing_on(OperationKind::MaxFilter));
    store.set_base_image(gradient(6, 6));
    store.append_operation(Operation::GreyScale).unwrap();
    store.re_evaluate().unwrap();
    let before = Arc::clone(store.output().unwrap());

    store
        .append_operation(Operation::Linear {
            gain: 0.5,
            bias: 0.0,
        })
        .unwrap();
    store
        .append_operation(Operation::MaxFilter { distance: 1 })
        .unwrap();
    store
        .append_operation(Operation::Flip { axis: FlipAxis::Y })
        .unwrap();

    let err = store.re_evaluate().unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Evaluation {
            at_index: 2,
            cause: EngineError::InvalidParameter {
                kind: OperationKind::MaxFilter,
                ..
            },
        }
    ));
    assert_eq!(store.state(), PipelineState::Stale);
    assert!(Arc::ptr_eq(store.output().unwrap(), &before));
    assert_eq!(store.log().len(), 4);

    // The step after the failure never ran.
    assert_eq!(store.engine().calls(), 1 + 3);
}

#[test]
fn evaluate_without_base_is_a_no_op() {
    let mut store = PipelineStore::new(Instrumented::default());
    store.append_operation(Operation::Equalize).unwrap();
    assert_eq!(store.re_evaluate().unwrap(), ReEvaluation::NoBaseImage);
    assert!(store.output().is_none());
    assert_eq!(store.engine().calls(), 0);
}

#[test]
fn operations_round_trip_through_json_records() {
    let ops = vec![
        Operation::Linear {
            gain: 1.2,
            bias: -4.0,
        },
        Operation::convolution(vec![0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0], 3, 3)
            .unwrap(),
        Operation::Flip { axis: FlipAxis::Y },
        Operation::Equalize,
        Operation::LaplacianOfGaussianEdge { threshold: 12.0 },
    ];
    let json = serde_json::to_string(&ops).unwrap();
    let back: Vec<Operation> = serde_json::from_str(&json).unwrap();
    assert_eq!(back, ops);
}

#[test]
fn worker_runs_only_the_newest_queued_request() {
    let (engine, entered, release) = Gated::new();
    let worker = EvaluationWorker::spawn(Arc::new(engine)).unwrap();
    let mut store = PipelineStore::default();
    store.set_base_image(gradient(10, 10));

    store.append_operation(Operation::GreyScale).unwrap();
    let first = store.request_evaluation().unwrap();
    let first_revision = first.revision;
    worker.submit(first).unwrap();
    // The worker is now parked inside the first request.
    entered.recv().unwrap();

    store
        .append_operation(Operation::CropRight { removal: 1 })
        .unwrap();
    worker.submit(store.request_evaluation().unwrap()).unwrap();
    store
        .append_operation(Operation::CropBottom { removal: 2 })
        .unwrap();
    let last = store.request_evaluation().unwrap();
    let last_revision = last.revision;
    worker.submit(last).unwrap();

    release.send(()).unwrap();
    let revisions = [
        worker.recv().unwrap().revision,
        worker.recv().unwrap().revision,
    ];
    assert_eq!(revisions, [first_revision, last_revision]);
    assert!(
        worker
            .recv_timeout(Duration::from_millis(50))
            .unwrap()
            .is_none()
    );
}
