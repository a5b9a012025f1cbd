//! Worker threads and the endpoints used to talk to them.
//!
//! Each worker is a single thread that owns its state outright and processes
//! requests one at a time. Requests and replies travel over unbounded
//! crossbeam channels, so posting never blocks the caller.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use crate::TransportError;

/// A single-threaded message handler.
///
/// `handle` runs to completion before the next request is looked at; replies
/// pushed into `replies` are delivered in order once it returns.
pub trait Worker: Send + 'static {
    type Request: Send + 'static;
    type Response: Send + 'static;

    fn handle(&mut self, request: Self::Request, replies: &mut Vec<Self::Response>);
}

/// One side of a request/response link, as seen by the coordinator.
pub trait Port {
    type Request;
    type Response;

    /// Fire-and-forget delivery.
    fn post(&self, request: Self::Request) -> Result<(), TransportError>;

    /// Next reply if one has arrived. Never blocks.
    fn try_recv(&self) -> Result<Option<Self::Response>, TransportError>;

    /// Requests posted but not yet picked up by the worker.
    fn backlog(&self) -> usize;

    /// Stop the worker unconditionally. Messages still queued are dropped.
    fn terminate(&mut self);
}

/// Owning handle to a spawned [`Worker`] thread.
pub struct WorkerHandle<Req, Resp> {
    name: String,
    requests: Option<Sender<Req>>,
    responses: Receiver<Resp>,
    stopped: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

/// Spawn `worker` on a named thread.
pub fn spawn_worker<W: Worker>(
    name: &str,
    worker: W,
) -> Result<WorkerHandle<W::Request, W::Response>, TransportError> {
    let (request_tx, request_rx) = crossbeam_channel::unbounded();
    let (response_tx, response_rx) = crossbeam_channel::unbounded();
    let stopped = Arc::new(AtomicBool::new(false));

    let thread = thread::Builder::new().name(name.to_owned()).spawn({
        let stopped = Arc::clone(&stopped);
        let name = name.to_owned();
        move || run(worker, &name, request_rx, response_tx, stopped)
    })?;

    tracing::debug!(worker = name, "worker spawned");
    Ok(WorkerHandle {
        name: name.to_owned(),
        requests: Some(request_tx),
        responses: response_rx,
        stopped,
        thread: Some(thread),
    })
}

fn run<W: Worker>(
    mut worker: W,
    name: &str,
    requests: Receiver<W::Request>,
    responses: Sender<W::Response>,
    stopped: Arc<AtomicBool>,
) {
    let mut replies = Vec::new();
    while let Ok(request) = requests.recv() {
        if stopped.load(Ordering::Acquire) {
            break;
        }
        worker.handle(request, &mut replies);
        for reply in replies.drain(..) {
            if responses.send(reply).is_err() {
                tracing::debug!(worker = name, "reply channel closed");
                return;
            }
        }
    }
    tracing::debug!(worker = name, "worker loop exited");
}

impl<Req, Resp> WorkerHandle<Req, Resp> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_terminated(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Terminate and wait for the thread to finish its current message.
    pub fn join(mut self) -> Result<(), TransportError> {
        self.terminate();
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        match thread.join() {
            Ok(()) => Ok(()),
            Err(payload) => Err(TransportError::WorkerPanicked {
                worker: self.name.clone(),
                message: panic_message(payload.as_ref()),
            }),
        }
    }

    fn lost(&self) -> TransportError {
        if self.stopped.load(Ordering::Acquire) {
            return TransportError::Terminated(self.name.clone());
        }
        match &self.thread {
            Some(t) if t.is_finished() => TransportError::WorkerPanicked {
                worker: self.name.clone(),
                message: "worker thread exited unexpectedly".into(),
            },
            _ => TransportError::Disconnected(self.name.clone()),
        }
    }
}

impl<Req, Resp> Port for WorkerHandle<Req, Resp> {
    type Request = Req;
    type Response = Resp;

    fn post(&self, request: Req) -> Result<(), TransportError> {
        if self.is_terminated() {
            return Err(TransportError::Terminated(self.name.clone()));
        }
        let Some(requests) = &self.requests else {
            return Err(TransportError::Terminated(self.name.clone()));
        };
        requests.send(request).map_err(|_| self.lost())
    }

    fn try_recv(&self) -> Result<Option<Resp>, TransportError> {
        match self.responses.try_recv() {
            Ok(response) => Ok(Some(response)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(self.lost()),
        }
    }

    fn backlog(&self) -> usize {
        self.requests.as_ref().map_or(0, |tx| tx.len())
    }

    fn terminate(&mut self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            tracing::debug!(worker = %self.name, "worker terminated");
        }
        // Dropping the sender wakes a worker blocked in recv.
        self.requests = None;
    }
}

impl<Req, Resp> Drop for WorkerHandle<Req, Resp> {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
