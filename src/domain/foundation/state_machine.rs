//! Lifecycle statuses with an explicit successor table.

use super::ValidationError;

/// A status enum whose allowed moves are listed once, in [`successors`].
///
/// ```ignore
/// impl StateMachine for AttemptOutcome {
///     fn successors(&self) -> &'static [Self] {
///         match self {
///             Pending => &[Success, Failed],
///             Success | Failed => &[],
///         }
///     }
/// }
/// ```
///
/// [`successors`]: StateMachine::successors
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug + 'static {
    /// Statuses reachable in one step.
    fn successors(&self) -> &'static [Self];

    fn can_transition_to(&self, target: &Self) -> bool {
        self.successors().contains(target)
    }

    /// Returns `target` if the move is allowed.
    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if self.can_transition_to(&target) {
            return Ok(target);
        }
        Err(ValidationError::invalid_format(
            "status",
            format!("{:?} cannot move to {:?}", self, target),
        ))
    }

    fn is_terminal(&self) -> bool {
        self.successors().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Door {
        Open,
        Closed,
        Locked,
        Bricked,
    }

    impl StateMachine for Door {
        fn successors(&self) -> &'static [Self] {
            match self {
                Door::Open => &[Door::Closed],
                Door::Closed => &[Door::Open, Door::Locked, Door::Bricked],
                Door::Locked => &[Door::Closed],
                Door::Bricked => &[],
            }
        }
    }

    #[test]
    fn listed_moves_are_allowed() {
        assert_eq!(Door::Closed.transition_to(Door::Locked), Ok(Door::Locked));
        assert!(Door::Locked.can_transition_to(&Door::Closed));
    }

    #[test]
    fn unlisted_moves_are_rejected() {
        assert!(matches!(
            Door::Open.transition_to(Door::Locked),
            Err(ValidationError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn terminal_means_no_successors() {
        assert!(Door::Bricked.is_terminal());
        assert!(!Door::Open.is_terminal());
    }
}
