use std::any::Any;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::connection::Connection;
use crate::error::MapperError;

pub(super) type BoxedResponse = Result<Box<dyn Any + Send>, MapperError>;
pub(super) type BoxedCallback = Box<dyn FnOnce(&mut Connection) -> BoxedResponse + Send>;

pub(super) enum Command {
    Call {
        callback: BoxedCallback,
        token: Option<CancellationToken>,
        respond_to: oneshot::Sender<BoxedResponse>,
    },
    Close {
        respond_to: oneshot::Sender<Result<(), MapperError>>,
    },
    Shutdown,
}
