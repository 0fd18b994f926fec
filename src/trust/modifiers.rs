//! Plugin override points for review and recalculation
//!
//! Modifiers run in registration order. Returning `true` forces the result
//! and stops the remaining modifiers; `false` means no override, and when no
//! modifier overrides the default logic runs.

use crate::trust::{TrustLevel, User};

type ReviewModifier = Box<dyn Fn(Option<&User>) -> bool + Send + Sync>;
type RecalculateModifier = Box<dyn Fn(&User, TrustLevel) -> bool + Send + Sync>;

#[derive(Default)]
pub struct Modifiers {
    review: Vec<ReviewModifier>,
    recalculate: Vec<RecalculateModifier>,
}

impl Modifiers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an override for `review`. Also consulted when the user is absent.
    pub fn on_review<F>(&mut self, modifier: F) -> &mut Self
    where
        F: Fn(Option<&User>) -> bool + Send + Sync + 'static,
    {
        self.review.push(Box::new(modifier));
        self
    }

    /// Register an override for the cascade in `recalculate`.
    /// Receives the user and the granted level after clamping.
    pub fn on_recalculate<F>(&mut self, modifier: F) -> &mut Self
    where
        F: Fn(&User, TrustLevel) -> bool + Send + Sync + 'static,
    {
        self.recalculate.push(Box::new(modifier));
        self
    }

    pub fn overrides_review(&self, user: Option<&User>) -> bool {
        self.review.iter().any(|m| m(user))
    }

    pub fn overrides_recalculate(&self, user: &User, granted: TrustLevel) -> bool {
        self.recalculate.iter().any(|m| m(user, granted))
    }
}

impl std::fmt::Debug for Modifiers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Modifiers")
            .field("review", &self.review.len())
            .field("recalculate", &self.recalculate.len())
            .finish()
    }
}
