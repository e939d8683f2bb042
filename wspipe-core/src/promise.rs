//! Write completion notification

use crate::error::{Error, Result};
use futures_util::FutureExt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Completes a pending write once the transport has flushed or dropped it
#[derive(Debug)]
pub struct WritePromise {
    tx: oneshot::Sender<Result<()>>,
}

impl WritePromise {
    /// Create a promise and the future observing it
    pub fn new() -> (Self, WriteFuture) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, WriteFuture { rx })
    }

    /// Report success
    pub fn succeed(self) {
        let _ = self.tx.send(Ok(()));
    }

    /// Report failure
    pub fn fail(self, error: Error) {
        let _ = self.tx.send(Err(error));
    }

    /// Report the given outcome
    pub fn complete(self, result: Result<()>) {
        let _ = self.tx.send(result);
    }
}

/// Resolves with the outcome of a write.
///
/// A promise dropped without being completed resolves to
/// [`Error::Connection`].
#[derive(Debug)]
pub struct WriteFuture {
    rx: oneshot::Receiver<Result<()>>,
}

impl WriteFuture {
    /// Outcome if already known, without waiting
    pub fn try_result(&mut self) -> Option<Result<()>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(abandoned())),
        }
    }
}

impl Future for WriteFuture {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.rx
            .poll_unpin(cx)
            .map(|received| received.unwrap_or_else(|_| Err(abandoned())))
    }
}

fn abandoned() -> Error {
    Error::Connection("write abandoned before completion".to_string())
}

/// Complete an optional promise
pub(crate) fn complete(promise: Option<WritePromise>, result: Result<()>) {
    if let Some(promise) = promise {
        promise.complete(result);
    }
}
