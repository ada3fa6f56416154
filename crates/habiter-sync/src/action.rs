#![forbid(unsafe_code)]

//! Deferred, multi-step actions.
//!
//! A [`DeferredAction`] is built long before it runs: a root step followed
//! by any number of chained [`Step`]s. [`invoke`](DeferredAction::invoke)
//! runs the steps in order, synchronously, exactly once.
//!
//! # Step semantics
//!
//! - A step built with [`Step::with_previous`] receives the result of the
//!   step before it; a step built with [`Step::new`] ignores it. Any other
//!   argument a step needs is captured by its closure.
//! - The first failing step ends the run. Its error is recorded on the
//!   action. If the step has an error handler, the handler sees the error
//!   and `invoke` returns `Ok(None)`; otherwise the error is returned as
//!   [`ActionError::Step`].
//! - On success the last step's result is recorded, the optional completion
//!   callback runs, and `invoke` returns `Ok(Some(result))`.
//!
//! # Invariants
//!
//! 1. An action leaves [`ActionStatus::Pending`] exactly once.
//! 2. Steps after the first failing step never run.
//! 3. Invoking an action that is not pending fails with
//!    [`ActionError::AlreadyInvoked`] and runs nothing.

use std::fmt;
use std::mem;

use tracing::{debug, warn};

type StandaloneFn<V, E> = Box<dyn FnOnce() -> Result<V, E>>;
type ChainedFn<V, E> = Box<dyn FnOnce(V) -> Result<V, E>>;
type ErrorHandler<E> = Box<dyn FnOnce(&E)>;

enum StepFn<V, E> {
    Standalone(StandaloneFn<V, E>),
    WithPrevious(ChainedFn<V, E>),
}

/// One link of a [`DeferredAction`] chain.
pub struct Step<V, E> {
    run: StepFn<V, E>,
    on_error: Option<ErrorHandler<E>>,
}

impl<V, E> Step<V, E> {
    /// A step that does not look at the previous result.
    pub fn new(run: impl FnOnce() -> Result<V, E> + 'static) -> Self {
        Self {
            run: StepFn::Standalone(Box::new(run)),
            on_error: None,
        }
    }

    /// A step that receives the previous step's result.
    pub fn with_previous(run: impl FnOnce(V) -> Result<V, E> + 'static) -> Self {
        Self {
            run: StepFn::WithPrevious(Box::new(run)),
            on_error: None,
        }
    }

    /// Handle this step's failure locally instead of returning it.
    #[must_use]
    pub fn on_error(mut self, handler: impl FnOnce(&E) + 'static) -> Self {
        self.on_error = Some(Box::new(handler));
        self
    }

    /// Whether the step receives the previous result.
    #[must_use]
    pub fn takes_previous(&self) -> bool {
        matches!(self.run, StepFn::WithPrevious(_))
    }

    /// Whether the step has an error handler.
    #[must_use]
    pub fn has_error_handler(&self) -> bool {
        self.on_error.is_some()
    }
}

impl<V, E> fmt::Debug for Step<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("takes_previous", &self.takes_previous())
            .field("has_error_handler", &self.has_error_handler())
            .finish()
    }
}

/// Lifecycle of a [`DeferredAction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionStatus {
    /// Not invoked yet.
    Pending,
    /// Currently running its steps.
    Running,
    /// All steps succeeded; the result is recorded.
    Completed,
    /// A step failed; the error is recorded.
    Failed,
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Errors from [`DeferredAction::invoke`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionError<E> {
    /// Step `step` (0 = root) failed and had no error handler.
    Step { step: usize, error: E },
    /// The action was not pending.
    AlreadyInvoked { status: ActionStatus },
}

impl<E> ActionError<E> {
    /// The step error, if this is a step failure.
    #[must_use]
    pub fn step_error(&self) -> Option<&E> {
        match self {
            Self::Step { error, .. } => Some(error),
            Self::AlreadyInvoked { .. } => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for ActionError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Step { step, error } => write!(f, "step {step} failed: {error}"),
            Self::AlreadyInvoked { status } => {
                write!(f, "action cannot be invoked again (already {status})")
            }
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for ActionError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Step { error, .. } => Some(error),
            Self::AlreadyInvoked { .. } => None,
        }
    }
}

struct Chain<V, E> {
    root: StandaloneFn<V, E>,
    root_on_error: Option<ErrorHandler<E>>,
    rest: Vec<Step<V, E>>,
}

enum State<V, E> {
    Pending(Chain<V, E>),
    Running,
    Completed(V),
    Failed { step: usize, error: E },
}

impl<V, E> State<V, E> {
    fn status(&self) -> ActionStatus {
        match self {
            Self::Pending(_) => ActionStatus::Pending,
            Self::Running => ActionStatus::Running,
            Self::Completed(_) => ActionStatus::Completed,
            Self::Failed { .. } => ActionStatus::Failed,
        }
    }
}

/// A not-yet-executed chain of effectful steps.
pub struct DeferredAction<V, E> {
    description: String,
    state: State<V, E>,
    on_complete: Option<Box<dyn FnOnce(&V)>>,
}

impl<V: Clone, E: Clone> DeferredAction<V, E> {
    /// Create an action whose root step is `root`.
    pub fn new(description: impl Into<String>, root: impl FnOnce() -> Result<V, E> + 'static) -> Self {
        Self {
            description: description.into(),
            state: State::Pending(Chain {
                root: Box::new(root),
                root_on_error: None,
                rest: Vec::new(),
            }),
            on_complete: None,
        }
    }

    /// Handle a failure of the root step locally.
    #[must_use]
    pub fn on_root_error(mut self, handler: impl FnOnce(&E) + 'static) -> Self {
        if let State::Pending(chain) = &mut self.state {
            chain.root_on_error = Some(Box::new(handler));
        }
        self
    }

    /// Append `step` to the chain.
    ///
    /// Steps appended after the action has been invoked are dropped; an
    /// action runs at most once.
    #[must_use]
    pub fn chain_action(mut self, step: Step<V, E>) -> Self {
        match &mut self.state {
            State::Pending(chain) => chain.rest.push(step),
            other => warn!(
                description = %self.description,
                status = %other.status(),
                "step appended to an action that already ran"
            ),
        }
        self
    }

    /// Run `callback` with the final result after a successful invocation.
    #[must_use]
    pub fn on_complete(mut self, callback: impl FnOnce(&V) + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    /// Run every step in order.
    ///
    /// Returns `Ok(Some(result))` on success and `Ok(None)` when a failing
    /// step handled its own error.
    ///
    /// # Errors
    ///
    /// [`ActionError::Step`] for an unhandled step failure;
    /// [`ActionError::AlreadyInvoked`] if the action is not pending.
    pub fn invoke(&mut self) -> Result<Option<V>, ActionError<E>> {
        let chain = match mem::replace(&mut self.state, State::Running) {
            State::Pending(chain) => chain,
            other => {
                let status = other.status();
                self.state = other;
                return Err(ActionError::AlreadyInvoked { status });
            }
        };
        debug!(
            description = %self.description,
            steps = chain.rest.len() + 1,
            "invoking deferred action"
        );

        let Chain {
            root,
            root_on_error,
            rest,
        } = chain;
        let mut value = match root() {
            Ok(value) => value,
            Err(error) => return self.fail(0, error, root_on_error),
        };
        for (offset, step) in rest.into_iter().enumerate() {
            let outcome = match step.run {
                StepFn::Standalone(run) => run(),
                StepFn::WithPrevious(run) => run(value),
            };
            value = match outcome {
                Ok(next) => next,
                Err(error) => return self.fail(offset + 1, error, step.on_error),
            };
        }

        self.state = State::Completed(value.clone());
        if let Some(callback) = self.on_complete.take() {
            callback(&value);
        }
        debug!(description = %self.description, "deferred action completed");
        Ok(Some(value))
    }

    fn fail(
        &mut self,
        step: usize,
        error: E,
        handler: Option<ErrorHandler<E>>,
    ) -> Result<Option<V>, ActionError<E>> {
        self.state = State::Failed {
            step,
            error: error.clone(),
        };
        match handler {
            Some(handler) => {
                debug!(description = %self.description, step, "deferred action failed, handled");
                handler(&error);
                Ok(None)
            }
            None => {
                warn!(description = %self.description, step, "deferred action failed");
                Err(ActionError::Step { step, error })
            }
        }
    }
}

impl<V, E> DeferredAction<V, E> {
    /// Human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> ActionStatus {
        self.state.status()
    }

    /// Whether the action has not run yet.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self.state, State::Pending(_))
    }

    /// Whether the action completed successfully.
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self.state, State::Completed(_))
    }

    /// The recorded result of a completed action.
    #[must_use]
    pub fn result(&self) -> Option<&V> {
        match &self.state {
            State::Completed(value) => Some(value),
            _ => None,
        }
    }

    /// The recorded error of a failed action.
    #[must_use]
    pub fn error(&self) -> Option<&E> {
        match &self.state {
            State::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Index of the failed step (0 = root).
    #[must_use]
    pub fn failed_step(&self) -> Option<usize> {
        match self.state {
            State::Failed { step, .. } => Some(step),
            _ => None,
        }
    }

    /// Number of steps, root included, while the action is pending.
    #[must_use]
    pub fn step_count(&self) -> Option<usize> {
        match &self.state {
            State::Pending(chain) => Some(chain.rest.len() + 1),
            _ => None,
        }
    }
}

impl<V, E> fmt::Display for DeferredAction<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

impl<V, E> fmt::Debug for DeferredAction<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredAction")
            .field("description", &self.description)
            .field("status", &self.status())
            .field("failed_step", &self.failed_step())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
