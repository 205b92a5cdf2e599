//! Scripting hook boundary.
//!
//! The scripting engine itself lives outside this core; handlers and the
//! data loader only ever see the tri-state outcome of running a named hook.

/// Result of attempting to run a scripted event hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    /// Hook existed and ran to completion.
    Success,
    /// No hook is defined for this event; not an error.
    NotDefined,
    /// Hook existed but failed. The caller logs and continues.
    Error,
}

/// Opaque runner for small lifecycle event hooks (on-load, on-insert, ...).
///
/// Implementations must not panic; a failing script is reported as
/// [`HookOutcome::Error`].
pub trait HookRunner: Send + Sync {
    fn run_hook(&self, script: &str, event: &str) -> HookOutcome;
}

/// Default runner for worlds with no scripting engine attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHookRunner;

impl HookRunner for NoopHookRunner {
    fn run_hook(&self, _script: &str, _event: &str) -> HookOutcome {
        HookOutcome::NotDefined
    }
}
