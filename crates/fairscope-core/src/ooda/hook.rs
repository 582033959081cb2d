//! Optional mitigation callback invoked by the Act stage.

use crate::domain::Decision;

/// External remediation step run for decisions that require mitigation.
///
/// Returning `Ok(true)` means the mitigation was applied, `Ok(false)` that the
/// hook chose not to act. Errors are recorded in the action notes and never
/// abort the cycle.
pub trait MitigationHook: Send + Sync {
    fn apply_mitigation(&self, decision: &Decision) -> anyhow::Result<bool>;
}

impl<F> MitigationHook for F
where
    F: Fn(&Decision) -> anyhow::Result<bool> + Send + Sync,
{
    fn apply_mitigation(&self, decision: &Decision) -> anyhow::Result<bool> {
        self(decision)
    }
}
