//! Per-manga flush scheduling
//!
//! One debounce task per manga ID. Arming a key cancels the previous task for
//! that key. Signals only reach a task still waiting out its delay; a task
//! that has started writing finishes regardless. Superseded handles are kept
//! so shutdown can wait for writes still in flight.

use std::collections::HashMap;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Control message for a waiting flush task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlushSignal {
    /// Superseded or deleted; exit without writing
    Cancel,
    /// Skip the rest of the delay and write now
    FlushNow,
}

struct ScheduledFlush {
    control: oneshot::Sender<FlushSignal>,
    task: JoinHandle<()>,
}

/// Arena of scheduled flush tasks keyed by manga ID
#[derive(Default)]
pub(crate) struct FlushSchedule {
    scheduled: HashMap<String, ScheduledFlush>,
    retired: Vec<JoinHandle<()>>,
}

impl FlushSchedule {
    /// Register a new task for a key, cancelling whatever was there
    pub fn arm(
        &mut self,
        manga_id: String,
        control: oneshot::Sender<FlushSignal>,
        task: JoinHandle<()>,
    ) {
        if let Some(previous) = self.scheduled.insert(manga_id, ScheduledFlush { control, task }) {
            self.retire(previous);
        }
        self.retired.retain(|handle| !handle.is_finished());
    }

    /// Cancel the task for a key; returns whether one was registered
    pub fn cancel(&mut self, manga_id: &str) -> bool {
        match self.scheduled.remove(manga_id) {
            Some(previous) => {
                self.retire(previous);
                true
            }
            None => false,
        }
    }

    /// Release every waiting task and take all handles so the caller can await them
    pub fn drain(&mut self) -> Vec<JoinHandle<()>> {
        let mut handles: Vec<_> = self
            .scheduled
            .drain()
            .map(|(_, flush)| {
                let _ = flush.control.send(FlushSignal::FlushNow);
                flush.task
            })
            .collect();
        handles.append(&mut self.retired);
        handles
    }

    /// Number of tasks not yet finished
    pub fn active(&self) -> usize {
        self.scheduled
            .values()
            .map(|s| &s.task)
            .chain(self.retired.iter())
            .filter(|handle| !handle.is_finished())
            .count()
    }

    fn retire(&mut self, flush: ScheduledFlush) {
        // The receiver is gone once the task stops waiting; that's fine.
        let _ = flush.control.send(FlushSignal::Cancel);
        self.retired.push(flush.task);
    }
}
