use std::fmt;

use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeAction {
    Insert,
    Update,
    Delete,
}

/// Notification raised after a mapped write changed at least one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableChanged {
    pub table: String,
    pub action: ChangeAction,
    pub rows: usize,
}

pub type ChangeListener = Box<dyn Fn(&TableChanged) + Send + Sync>;

#[derive(Default)]
pub(crate) struct Listeners(Vec<ChangeListener>);

impl Listeners {
    pub(crate) fn push(&mut self, listener: ChangeListener) {
        self.0.push(listener);
    }

    /// Writes that changed nothing are not reported.
    pub(crate) fn notify(&self, table: &str, action: ChangeAction, rows: usize) {
        if rows == 0 || self.0.is_empty() {
            return;
        }
        let event = TableChanged {
            table: table.to_owned(),
            action,
            rows,
        };
        trace!(?event, listeners = self.0.len(), "table changed");
        for listener in &self.0 {
            listener(&event);
        }
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners").field("count", &self.0.len()).finish()
    }
}
