use gate_policy::{Denial, GateResult};
use gate_primitives::{ActionDescriptor, Decision};
use tracing::{debug, warn};

use crate::error::{InterceptError, InterceptResult};

/// Turns an evaluation result into permission to proceed.
///
/// Deny decisions and every client error block. Allow and undecided
/// approval-required decisions proceed.
pub(crate) fn enforce(
    action: &ActionDescriptor,
    evaluated: GateResult<Decision>,
) -> InterceptResult<Decision> {
    let blocked = match evaluated {
        Ok(decision) if decision.is_deny() => Denial::from_decision(&decision).blocked_message(),
        Ok(decision) => {
            debug!(
                action = %action.label(),
                decision = %decision.outcome(),
                "intercepted action permitted"
            );
            return Ok(decision);
        }
        Err(err) => err.blocked_message(),
    };
    warn!(action = %action.label(), message = %blocked, "intercepted action blocked");
    Err(InterceptError::blocked(blocked))
}

#[cfg(test)]
mod tests {
    use gate_policy::GateError;
    use gate_primitives::{ActionType, Outcome};

    use super::*;

    fn action() -> ActionDescriptor {
        ActionDescriptor::new(ActionType::CommandExec, "rm")
    }

    #[test]
    fn deny_decision_blocks_with_help_text() {
        let decision = Decision::new(Outcome::Deny)
            .with_reason("destructive")
            .with_help("", "Use trash instead");

        let err = enforce(&action(), Ok(decision)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "action denied - destructive. Use trash instead"
        );
    }

    #[test]
    fn unreachable_server_blocks() {
        let err = enforce(&action(), Err(GateError::unreachable("refused"))).unwrap_err();
        assert!(err.is_blocked());
        assert!(err.to_string().contains("refused"));
    }

    #[test]
    fn undecided_approval_proceeds() {
        let decision = Decision::new(Outcome::ApprovalRequired);
        assert!(enforce(&action(), Ok(decision)).is_ok());
    }
}
