//! Asynchronous facade: one worker thread per connection, fed by a FIFO command channel.

mod channel;
mod connection;
mod dispatcher;
mod manager;

pub use connection::{AsyncConnection, AsyncTable};
