/*!
Automation runtime: the per-invocation context, the orchestrator that runs an
event's executor chain followed by its actions, and call-site helpers.

Within one invocation steps never overlap: every executor completes (or the
chain aborts) before the first action starts, and each step sees the results
of all steps before it.
*/

pub mod context;
pub mod guard;
pub mod orchestrator;

pub use context::ExecutionContext;
pub use guard::{DEFAULT_DEBOUNCE, Debouncer, GuardToken, TriggerGuard};
pub use orchestrator::{
    ActionOutcome, ActionStatus, AutomationError, ExecutionReport, Runtime, TriggerOutcome,
};
