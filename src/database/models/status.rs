use std::fmt::Display;

use crate::error::AppError;

/// Status field of a record whose only non-terminal state is `Pending`.
///
/// Every legal move goes from `Pending` to a terminal state; terminal
/// records never move again.
pub trait LifecycleStatus: Copy + PartialEq + Display {
    const ENTITY: &'static str;

    fn is_pending(&self) -> bool;

    fn is_terminal(&self) -> bool {
        !self.is_pending()
    }

    fn can_transition_to(&self, next: Self) -> bool {
        self.is_pending() && next.is_terminal()
    }

    fn transition_to(self, next: Self) -> Result<Self, AppError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(AppError::invalid_transition(Self::ENTITY, self, next))
        }
    }
}
