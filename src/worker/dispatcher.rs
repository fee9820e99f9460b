use std::sync::mpsc::Receiver;

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::connection::Connection;
use crate::error::MapperError;

use super::channel::{BoxedCallback, BoxedResponse, Command};

/// Serve commands in arrival order until closed, shut down, or every sender is gone.
pub(super) fn run_worker(mut conn: Connection, receiver: &Receiver<Command>, cancel: &CancellationToken) {
    while let Ok(command) = receiver.recv() {
        match command {
            Command::Call {
                callback,
                token,
                respond_to,
            } => {
                let response = if cancel.is_cancelled() || token.as_ref().is_some_and(CancellationToken::is_cancelled) {
                    trace!("dropping cancelled call");
                    Err(MapperError::Cancelled)
                } else {
                    run_callback(&mut conn, callback)
                };
                let _ = respond_to.send(response);
            }
            Command::Close { respond_to } => {
                let result = conn.close();
                if let Err(err) = &result {
                    warn!(error = %err, "close reported an error");
                }
                let _ = respond_to.send(result);
                break;
            }
            Command::Shutdown => break,
        }
    }
    debug!(path = conn.path(), "worker stopped");
}

fn run_callback(conn: &mut Connection, callback: BoxedCallback) -> BoxedResponse {
    callback(conn)
}
