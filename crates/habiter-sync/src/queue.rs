#![forbid(unsafe_code)]

//! FIFO queue of deferred calls with an observable history.
//!
//! [`CallQueue`] keeps two observable sequences: `due` holds idempotent
//! calls waiting to be paced by hand and `done` holds everything else,
//! meaning calls already performed (successfully or not) and mutating calls,
//! which are never paced. [`perform_one`](CallQueue::perform_one) runs the
//! oldest due call and moves it to `done`. Every registered call sits in
//! exactly one of the two sequences. UI code subscribes to [`due`](CallQueue::due) and
//! [`done`](CallQueue::done) to show pending and finished work.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use habiter_model::{ObservableSeq, SeqError, SeqView};
use tracing::{debug, warn};

use crate::action::{ActionError, ActionStatus, DeferredAction};

/// Whether a call may be repeated without side effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CallKind {
    /// Reads only; safe to repeat.
    Idempotent,
    /// Changes server state.
    Mutating,
}

/// Shared handle to an action sitting in a [`CallQueue`].
pub struct QueuedCall<V, E> {
    description: Rc<str>,
    kind: CallKind,
    action: Rc<RefCell<DeferredAction<V, E>>>,
}

impl<V, E> Clone for QueuedCall<V, E> {
    fn clone(&self) -> Self {
        Self {
            description: Rc::clone(&self.description),
            kind: self.kind,
            action: Rc::clone(&self.action),
        }
    }
}

impl<V: Clone, E: Clone> QueuedCall<V, E> {
    fn new(action: DeferredAction<V, E>, kind: CallKind) -> Self {
        Self {
            description: Rc::from(action.description()),
            kind,
            action: Rc::new(RefCell::new(action)),
        }
    }

    fn invoke(&self) -> Result<Option<V>, ActionError<E>> {
        let mut action = self
            .action
            .try_borrow_mut()
            .map_err(|_| ActionError::AlreadyInvoked {
                status: ActionStatus::Running,
            })?;
        action.invoke()
    }

    /// Recorded result of a completed call.
    #[must_use]
    pub fn result(&self) -> Option<V> {
        self.action.try_borrow().ok()?.result().cloned()
    }

    /// Recorded error of a failed call.
    #[must_use]
    pub fn error(&self) -> Option<E> {
        self.action.try_borrow().ok()?.error().cloned()
    }
}

impl<V, E> QueuedCall<V, E> {
    /// The action's description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub fn kind(&self) -> CallKind {
        self.kind
    }

    /// Lifecycle state; [`ActionStatus::Running`] while the call executes.
    #[must_use]
    pub fn status(&self) -> ActionStatus {
        self.action
            .try_borrow()
            .map_or(ActionStatus::Running, |action| action.status())
    }

    /// Whether both handles refer to the same queued action.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.action, &other.action)
    }
}

impl<V, E> fmt::Display for QueuedCall<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

impl<V, E> fmt::Debug for QueuedCall<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedCall")
            .field("description", &self.description)
            .field("kind", &self.kind)
            .field("status", &self.status())
            .finish()
    }
}

/// What [`CallQueue::perform_one`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Performed<V> {
    /// Nothing was due.
    Idle,
    /// The call completed with this result.
    Completed(V),
    /// The call failed and a step's error handler dealt with it.
    Recovered,
}

/// Errors from [`CallQueue`] operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueError<E> {
    /// The performed call failed without a handler.
    Action(ActionError<E>),
    /// Moving the call between `due` and `done` was rejected.
    Sequence(SeqError),
}

impl<E> From<ActionError<E>> for QueueError<E> {
    fn from(err: ActionError<E>) -> Self {
        Self::Action(err)
    }
}

impl<E> From<SeqError> for QueueError<E> {
    fn from(err: SeqError) -> Self {
        Self::Sequence(err)
    }
}

impl<E: fmt::Display> fmt::Display for QueueError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Action(err) => write!(f, "queued call failed: {err}"),
            Self::Sequence(err) => write!(f, "call queue update rejected: {err}"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for QueueError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Action(err) => Some(err),
            Self::Sequence(err) => Some(err),
        }
    }
}

/// Due and done calls, both observable.
pub struct CallQueue<V, E> {
    due: ObservableSeq<QueuedCall<V, E>>,
    done: ObservableSeq<QueuedCall<V, E>>,
}

impl<V: Clone + 'static, E: Clone + 'static> CallQueue<V, E> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            due: ObservableSeq::new(),
            done: ObservableSeq::new(),
        }
    }

    /// Register `action`.
    ///
    /// Idempotent calls are appended to `due` and wait for
    /// [`perform_one`](Self::perform_one). Mutating calls are not paced:
    /// they go straight to the end of `done` without being invoked here.
    ///
    /// # Errors
    ///
    /// [`SeqError::Reentrant`] when called from a subscriber of the
    /// target sequence.
    pub fn add(
        &mut self,
        action: DeferredAction<V, E>,
        kind: CallKind,
    ) -> Result<QueuedCall<V, E>, SeqError> {
        let call = QueuedCall::new(action, kind);
        let target = match kind {
            CallKind::Idempotent => &self.due,
            CallKind::Mutating => &self.done,
        };
        target.push(call.clone())?;
        debug!(
            description = call.description(),
            kind = ?kind,
            due = self.due.len(),
            done = self.done.len(),
            "queued call"
        );
        Ok(call)
    }

    /// Perform the oldest due call and move it to the done calls.
    ///
    /// The call moves to `done` whether it succeeded or failed.
    ///
    /// # Errors
    ///
    /// [`QueueError::Action`] when the call failed without an error
    /// handler; [`QueueError::Sequence`] when `due` or `done` is emitting.
    pub fn perform_one(&mut self) -> Result<Performed<V>, QueueError<E>> {
        let Some(call) = self.due.get(0) else {
            debug!("call queue idle");
            return Ok(Performed::Idle);
        };
        if self.due.is_emitting() || self.done.is_emitting() {
            return Err(SeqError::Reentrant.into());
        }
        debug!(description = call.description(), "performing queued call");

        let outcome = call.invoke();
        self.due.remove(0)?;
        self.done.push(call.clone())?;

        match outcome {
            Ok(Some(value)) => Ok(Performed::Completed(value)),
            Ok(None) => Ok(Performed::Recovered),
            Err(err) => {
                warn!(description = call.description(), "queued call failed");
                Err(err.into())
            }
        }
    }

    /// Perform due calls until the queue is idle or a call fails.
    ///
    /// Returns the number of calls performed.
    ///
    /// # Errors
    ///
    /// The first [`perform_one`](Self::perform_one) error.
    pub fn drain(&mut self) -> Result<usize, QueueError<E>> {
        let mut performed = 0;
        while !self.due.is_empty() {
            self.perform_one()?;
            performed += 1;
        }
        Ok(performed)
    }
}

impl<V, E> CallQueue<V, E> {
    /// Read-only view of the calls waiting to run.
    #[must_use]
    pub fn due(&self) -> SeqView<QueuedCall<V, E>> {
        self.due.view()
    }

    /// Read-only view of the calls already performed.
    #[must_use]
    pub fn done(&self) -> SeqView<QueuedCall<V, E>> {
        self.done.view()
    }

    /// Whether no call is due.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.due.is_empty()
    }
}

impl<V: Clone + 'static, E: Clone + 'static> Default for CallQueue<V, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, E> fmt::Debug for CallQueue<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallQueue")
            .field("due", &self.due.len())
            .field("done", &self.done.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Step;
    use std::cell::Cell;

    fn descriptions<V, E>(view: &SeqView<QueuedCall<V, E>>) -> Vec<String> {
        view.with(|calls| calls.iter().map(|c| c.description().to_owned()).collect())
    }

    fn ok_action(description: &str, value: i32) -> DeferredAction<i32, String> {
        DeferredAction::new(description, move || Ok(value))
    }

    #[test]
    fn empty_queue_is_idle() {
        let mut queue: CallQueue<i32, String> = CallQueue::new();
        assert!(queue.is_idle());
        assert_eq!(queue.perform_one(), Ok(Performed::Idle));
        assert!(queue.done().is_empty());
    }

    #[test]
    fn mutating_calls_settle_immediately() {
        let mut queue = CallQueue::new();
        queue.add(ok_action("A", 1), CallKind::Idempotent).unwrap();
        assert_eq!(descriptions(&queue.due()), vec!["A"]);
        assert!(queue.done().is_empty());

        let write = queue.add(ok_action("B", 2), CallKind::Mutating).unwrap();
        assert_eq!(descriptions(&queue.due()), vec!["A"]);
        assert_eq!(descriptions(&queue.done()), vec!["B"]);
        assert_eq!(write.status(), ActionStatus::Pending);

        assert_eq!(queue.perform_one(), Ok(Performed::Completed(1)));
        assert!(queue.due().is_empty());
        assert_eq!(descriptions(&queue.done()), vec!["B", "A"]);
        assert_eq!(write.status(), ActionStatus::Pending);
    }

    #[test]
    fn performs_in_fifo_order() {
        let mut queue = CallQueue::new();
        queue.add(ok_action("first", 1), CallKind::Idempotent).unwrap();
        queue.add(ok_action("second", 2), CallKind::Idempotent).unwrap();
        assert_eq!(queue.perform_one(), Ok(Performed::Completed(1)));
        assert_eq!(descriptions(&queue.due()), vec!["second"]);
        assert_eq!(queue.perform_one(), Ok(Performed::Completed(2)));
        assert_eq!(descriptions(&queue.done()), vec!["first", "second"]);
        assert_eq!(queue.perform_one(), Ok(Performed::Idle));
    }

    #[test]
    fn failed_call_still_moves_to_done() {
        let mut queue: CallQueue<i32, String> = CallQueue::new();
        let failing = DeferredAction::new("broken", || Err("offline".to_owned()));
        let handle = queue.add(failing, CallKind::Idempotent).unwrap();
        queue.add(ok_action("next", 5), CallKind::Idempotent).unwrap();

        let err = queue.perform_one().unwrap_err();
        assert_eq!(
            err,
            QueueError::Action(ActionError::Step {
                step: 0,
                error: "offline".to_owned()
            })
        );
        assert_eq!(descriptions(&queue.done()), vec!["broken"]);
        assert_eq!(descriptions(&queue.due()), vec!["next"]);
        assert_eq!(handle.status(), ActionStatus::Failed);
        assert_eq!(handle.error().as_deref(), Some("offline"));
    }

    #[test]
    fn handled_failure_is_recovered() {
        let handled = Rc::new(Cell::new(false));
        let flag = Rc::clone(&handled);
        let mut queue: CallQueue<i32, String> = CallQueue::new();
        let action = DeferredAction::new("load", || Ok(1)).chain_action(
            Step::with_previous(|_| Err("bad json".to_owned())).on_error(move |_| flag.set(true)),
        );
        queue.add(action, CallKind::Idempotent).unwrap();
        assert_eq!(queue.perform_one(), Ok(Performed::Recovered));
        assert!(handled.get());
        assert_eq!(queue.done().len(), 1);
    }

    #[test]
    fn handles_share_the_queued_action() {
        let mut queue = CallQueue::new();
        let handle = queue.add(ok_action("one", 1), CallKind::Idempotent).unwrap();
        assert_eq!(handle.status(), ActionStatus::Pending);
        queue.perform_one().unwrap();
        assert_eq!(handle.result(), Some(1));
        let done = queue.done().get(0).unwrap();
        assert!(done.ptr_eq(&handle));
        assert_eq!(done.kind(), CallKind::Idempotent);
    }

    #[test]
    fn views_report_changes() {
        let mut queue = CallQueue::new();
        let due_events = Rc::new(Cell::new(0));
        let done_events = Rc::new(Cell::new(0));
        let (d, f) = (Rc::clone(&due_events), Rc::clone(&done_events));
        let _due = queue.due().subscribe(move |_| d.set(d.get() + 1));
        let _done = queue.done().subscribe(move |_| f.set(f.get() + 1));

        queue.add(ok_action("x", 1), CallKind::Idempotent).unwrap();
        queue.perform_one().unwrap();
        assert_eq!(due_events.get(), 2);
        assert_eq!(done_events.get(), 1);
    }

    #[test]
    fn drain_runs_until_idle() {
        let mut queue = CallQueue::new();
        for (i, name) in ["a", "b", "c"].into_iter().enumerate() {
            queue
                .add(ok_action(name, i as i32), CallKind::Idempotent)
                .unwrap();
        }
        assert_eq!(queue.drain(), Ok(3));
        assert!(queue.is_idle());
        assert_eq!(descriptions(&queue.done()), vec!["a", "b", "c"]);
    }

    #[test]
    fn drain_stops_at_first_failure() {
        let mut queue: CallQueue<i32, String> = CallQueue::new();
        queue.add(ok_action("a", 1), CallKind::Idempotent).unwrap();
        queue
            .add(
                DeferredAction::new("b", || Err("no".to_owned())),
                CallKind::Idempotent,
            )
            .unwrap();
        queue.add(ok_action("c", 3), CallKind::Idempotent).unwrap();
        assert!(queue.drain().is_err());
        assert_eq!(descriptions(&queue.due()), vec!["c"]);
    }

    #[test]
    fn debug_and_display() {
        let mut queue = CallQueue::new();
        let call = queue.add(ok_action("sync", 0), CallKind::Mutating).unwrap();
        assert_eq!(call.to_string(), "sync");
        assert!(format!("{call:?}").contains("Mutating"));
        assert_eq!(format!("{queue:?}"), "CallQueue { due: 0, done: 1 }");
    }
}
