use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Sender};
use std::thread;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::connection::Connection;
use crate::error::MapperError;

use super::channel::{BoxedCallback, Command};
use super::dispatcher::run_worker;

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

/// Sending half of one connection's worker thread.
pub(super) struct Worker {
    sender: Sender<Command>,
}

impl Worker {
    /// Start the thread; `open` runs on it and its outcome is reported through the receiver.
    pub(super) fn spawn(
        open: impl FnOnce() -> Result<Connection, MapperError> + Send + 'static,
        cancel: CancellationToken,
    ) -> Result<(Self, oneshot::Receiver<Result<(), MapperError>>), MapperError> {
        let (sender, receiver) = mpsc::channel::<Command>();
        let (ready_tx, ready_rx) = oneshot::channel();
        let id = NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed);
        let handle = Handle::try_current().ok();
        thread::Builder::new()
            .name(format!("sqlite-mapper-worker-{id}"))
            .spawn(move || {
                let runtime_guard = handle.as_ref().map(Handle::enter);
                match open() {
                    Ok(conn) => {
                        let _ = ready_tx.send(Ok(()));
                        debug!(worker = id, "worker started");
                        run_worker(conn, &receiver, &cancel);
                    }
                    Err(err) => {
                        error!(worker = id, error = %err, "worker could not open its connection");
                        let _ = ready_tx.send(Err(err));
                    }
                }
                drop(runtime_guard);
            })
            .map_err(|err| MapperError::Connection(format!("failed to spawn worker thread: {err}")))?;

        Ok((Self { sender }, ready_rx))
    }

    fn send_command(&self, command: Command) -> Result<(), MapperError> {
        self.sender
            .send(command)
            .map_err(|_| connection_error("connection worker closed"))
    }

    pub(super) async fn call<F, R>(&self, token: Option<CancellationToken>, func: F) -> Result<R, MapperError>
    where
        F: FnOnce(&mut Connection) -> Result<R, MapperError> + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let callback: BoxedCallback = Box::new(move |conn| func(conn).map(|value| Box::new(value) as Box<dyn Any + Send>));
        self.send_command(Command::Call {
            callback,
            token,
            respond_to: tx,
        })?;
        match rx.await {
            Ok(Ok(payload)) => payload
                .downcast::<R>()
                .map(|boxed| *boxed)
                .map_err(|_| connection_error("worker response downcast failure")),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(connection_error("connection worker dropped while handling a call")),
        }
    }

    /// Close the connection once; later calls find the worker gone and succeed trivially.
    pub(super) async fn close(&self) -> Result<(), MapperError> {
        let (tx, rx) = oneshot::channel();
        if self.send_command(Command::Close { respond_to: tx }).is_err() {
            return Ok(());
        }
        rx.await.unwrap_or(Ok(()))
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        let _ = self.sender.send(Command::Shutdown);
    }
}

fn connection_error(message: &str) -> MapperError {
    MapperError::Connection(message.into())
}
