//! Per-connection transaction state.
//!
//! Each connection task owns one `TransactionState`; there is no shared
//! registry. Between MULTI and EXEC/DISCARD the connection queues commands
//! (name and raw arguments, no validation) and answers `+QUEUED`; EXEC
//! drains the queue for execution in order, DISCARD throws it away, and
//! closing the connection drops the state with the task.

use crate::commands::CommandHandler;

#[derive(Debug, Default)]
pub struct TransactionState {
    queue: Option<Vec<CommandHandler>>,
}

impl TransactionState {
    pub fn new() -> Self {
        Self { queue: None }
    }

    pub fn is_queuing(&self) -> bool {
        self.queue.is_some()
    }

    /// Enters queuing mode. Returns `false` when already inside a MULTI.
    pub fn begin(&mut self) -> bool {
        if self.queue.is_some() {
            return false;
        }

        self.queue = Some(Vec::new());
        true
    }

    /// Records a command for later execution by EXEC.
    pub fn queue(&mut self, command: CommandHandler) {
        if let Some(queue) = &mut self.queue {
            queue.push(command);
        }
    }

    /// Leaves queuing mode and hands back the queued commands, in order.
    /// Returns `None` when no MULTI is active.
    pub fn take(&mut self) -> Option<Vec<CommandHandler>> {
        self.queue.take()
    }

    /// Drops the queue. Returns `false` when no MULTI is active.
    pub fn discard(&mut self) -> bool {
        self.queue.take().is_some()
    }
}
