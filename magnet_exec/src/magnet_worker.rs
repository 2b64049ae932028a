//! # Magnet worker
//!
//! Runs the [`MagnetFacade`] on its own thread so that the console stays responsive during a
//! ramp. Requests are queued and executed one at a time. A `stop` request bypasses the queue and
//! cancels whatever ramp is in progress. Every request submitted before the stop that has not yet
//! started is answered with an error instead of being executed. A stop while nothing is
//! outstanding has no effect.
//!
//! Every queued request gets exactly one [`WorkerResponse`].

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{error, info, warn};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;

use magnet_if::request::Request;
use util::session;

use crate::cancel::CancelToken;
use crate::facade::{MagnetFacade, SetOutcome};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Session relative path vector ramp traces are saved under, timestamped.
pub const RAMP_TRACE_PATH: &str = "ramps/ramp.json";

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct MagnetWorker {
    request_sender: Option<Sender<Request>>,
    response_receiver: Receiver<WorkerResponse>,
    cancel: CancelToken,

    /// Number of submitted requests not yet answered
    outstanding: Arc<Mutex<usize>>,

    worker_jh: Option<JoinHandle<()>>,
}

/// The result of one executed request.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerResponse {
    pub request: Request,
    pub result: Result<String, String>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Could not start the worker thread: {0}")]
    SpawnError(std::io::Error),

    #[error("The worker thread has stopped")]
    Stopped,

    #[error("The worker thread panicked")]
    Panicked,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MagnetWorker {
    /// Move the facade onto a new worker thread.
    pub fn start(facade: MagnetFacade) -> Result<Self, WorkerError> {
        let cancel = facade.cancel_token();

        let (request_sender, rx) = channel();
        let (tx, response_receiver) = channel();

        let outstanding = Arc::new(Mutex::new(0));

        let worker_cancel = cancel.clone();
        let worker_outstanding = outstanding.clone();
        let worker_jh = thread::Builder::new()
            .name("magnet_worker".into())
            .spawn(move || worker_thread(facade, worker_cancel, worker_outstanding, rx, tx))
            .map_err(WorkerError::SpawnError)?;

        Ok(Self {
            request_sender: Some(request_sender),
            response_receiver,
            cancel,
            outstanding,
            worker_jh: Some(worker_jh),
        })
    }

    /// Queue a request, or cancel the running ramp if it is a stop.
    pub fn submit(&self, request: Request) -> Result<(), WorkerError> {
        let mut outstanding = lock(&self.outstanding);

        if request == Request::Stop {
            if *outstanding == 0 {
                info!("Stop requested, nothing to stop");
            } else {
                info!("Stop requested, cancelling {} request(s)", *outstanding);
                self.cancel.cancel();
            }
            return Ok(());
        }

        match &self.request_sender {
            Some(s) => {
                s.send(request).map_err(|_| WorkerError::Stopped)?;
                *outstanding += 1;
                Ok(())
            }
            None => Err(WorkerError::Stopped),
        }
    }

    /// A finished response, if one is waiting.
    pub fn try_recv(&self) -> Option<WorkerResponse> {
        self.response_receiver.try_recv().ok()
    }

    /// Wait up to `timeout` for the next response.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<WorkerResponse>, WorkerError> {
        match self.response_receiver.recv_timeout(timeout) {
            Ok(r) => Ok(Some(r)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(WorkerError::Stopped),
        }
    }

    /// Cancel any running ramp, then wait for the thread to finish.
    pub fn shutdown(mut self) -> Result<(), WorkerError> {
        self.cancel.cancel();

        // Dropping the sender ends the worker's receive loop
        self.request_sender = None;

        match self.worker_jh.take() {
            Some(jh) => jh.join().map_err(|_| WorkerError::Panicked),
            None => Ok(()),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn worker_thread(
    mut facade: MagnetFacade,
    cancel: CancelToken,
    outstanding: Arc<Mutex<usize>>,
    requests: Receiver<Request>,
    responses: Sender<WorkerResponse>,
) {
    while let Ok(request) = requests.recv() {
        // The token stays set until every request submitted before the stop has been answered
        let result = if cancel.is_cancelled() {
            warn!("Discarding \"{}\" submitted before a stop", request);
            Err("discarded by a stop".to_string())
        } else {
            execute(&mut facade, &request)
        };

        if let Some(trace) = facade.take_trace() {
            session::save_with_timestamp(RAMP_TRACE_PATH, trace);
        }

        match &result {
            Ok(s) => info!("{}: {}", request, s),
            Err(e) => error!("{}: {}", request, e),
        }

        {
            let mut outstanding = lock(&outstanding);
            *outstanding = outstanding.saturating_sub(1);
            if *outstanding == 0 {
                cancel.reset();
            }
        }

        if responses.send(WorkerResponse { request, result }).is_err() {
            warn!("Response receiver dropped, stopping worker");
            break;
        }
    }

    info!("Magnet worker stopped");
}

fn execute(facade: &mut MagnetFacade, request: &Request) -> Result<String, String> {
    match request {
        Request::Get(q) => facade
            .get(*q)
            .map(|v| format!("{} = {}", q, v))
            .map_err(|e| e.to_string()),
        Request::Set(q, v) => match facade.set(*q, v.clone()) {
            Ok(SetOutcome::Done(applied)) => Ok(format!("{} = {}", q, applied)),
            Ok(SetOutcome::Cancelled) => Ok(format!("{} cancelled", q)),
            Err(e) => Err(e.to_string()),
        },
        Request::Stop => Ok("nothing to stop".into()),
    }
}

fn lock(outstanding: &Mutex<usize>) -> MutexGuard<usize> {
    match outstanding.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
