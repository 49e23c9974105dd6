//! Off-thread evaluation.
//!
//! [`EvaluationWorker`] owns a dedicated thread that runs
//! [`EvaluationRequest`]s and posts back revision-tagged
//! [`EvaluationResponse`]s. The caller keeps editing the store while the
//! worker runs and feeds each response to
//! [`PipelineStore::complete_evaluation`](crate::store::PipelineStore::complete_evaluation),
//! which drops any that went stale in the meantime.
//!
//! When several requests queue up behind a running evaluation, only the
//! newest is run: the older ones describe a log that no longer exists.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::engine::Engine;
use crate::store::{EvaluationRequest, EvaluationResponse};

/// Errors from talking to an [`EvaluationWorker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum WorkerError {
    /// The worker thread has exited.
    #[error("evaluation worker has shut down")]
    Disconnected,
}

/// A background thread that evaluates operation sequences.
///
/// Dropping the worker closes its queue and joins the thread.
#[derive(Debug)]
pub struct EvaluationWorker {
    requests: Option<Sender<EvaluationRequest>>,
    responses: Receiver<EvaluationResponse>,
    handle: Option<JoinHandle<()>>,
}

impl EvaluationWorker {
    /// Spawn a worker thread that evaluates with `engine`.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn spawn<E>(engine: Arc<E>) -> std::io::Result<Self>
    where
        E: Engine + Send + Sync + 'static + ?Sized,
    {
        let (request_tx, request_rx) = mpsc::channel::<EvaluationRequest>();
        let (response_tx, response_rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("strata-evaluate".into())
            .spawn(move || serve(&*engine, &request_rx, &response_tx))?;
        Ok(Self {
            requests: Some(request_tx),
            responses: response_rx,
            handle: Some(handle),
        })
    }

    /// Queue a request for evaluation.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Disconnected`] if the worker thread has
    /// exited.
    pub fn submit(&self, request: EvaluationRequest) -> Result<(), WorkerError> {
        let requests = self.requests.as_ref().ok_or(WorkerError::Disconnected)?;
        log::debug!("submitting evaluation r{}", request.revision);
        requests
            .send(request)
            .map_err(|_| WorkerError::Disconnected)
    }

    /// Take a finished response if one is ready.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Disconnected`] if the worker thread has
    /// exited and no responses remain.
    pub fn try_recv(&self) -> Result<Option<EvaluationResponse>, WorkerError> {
        match self.responses.try_recv() {
            Ok(response) => Ok(Some(response)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(WorkerError::Disconnected),
        }
    }

    /// Block until the next response arrives.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Disconnected`] if the worker thread has
    /// exited and no responses remain.
    pub fn recv(&self) -> Result<EvaluationResponse, WorkerError> {
        self.responses.recv().map_err(|_| WorkerError::Disconnected)
    }

    /// Block for at most `timeout` waiting for the next response.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Disconnected`] if the worker thread has
    /// exited and no responses remain.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<EvaluationResponse>, WorkerError> {
        match self.responses.recv_timeout(timeout) {
            Ok(response) => Ok(Some(response)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(WorkerError::Disconnected),
        }
    }
}

impl Drop for EvaluationWorker {
    fn drop(&mut self) {
        drop(self.requests.take());
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            log::warn!("evaluation worker thread panicked");
        }
    }
}

/// Worker loop: run the newest queued request, reply, repeat until the
/// request channel closes.
fn serve<E: Engine + ?Sized>(
    engine: &E,
    requests: &Receiver<EvaluationRequest>,
    responses: &Sender<EvaluationResponse>,
) {
    while let Ok(mut request) = requests.recv() {
        for newer in requests.try_iter() {
            log::debug!(
                "skipping superseded evaluation r{} for r{}",
                request.revision,
                newer.revision
            );
            request = newer;
        }
        let response = request.run(engine);
        if responses.send(response).is_err() {
            break;
        }
    }
}
