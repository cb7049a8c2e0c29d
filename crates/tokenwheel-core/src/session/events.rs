//! User intents accepted by the session.

/// Discrete intents forwarded by a presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Begin a new generation from a prompt.
    Start(String),
    /// Accept the model's token at the current position.
    AcceptCurrent,
    /// Pick a candidate at the current position. Picking the model's own
    /// token is the same as `AcceptCurrent`.
    SelectToken(String),
    /// Signal that the user is about to diverge onto `candidate` (hover,
    /// pointer-down). Starts a speculative regeneration.
    NotifyDivergentCandidate(String),
    /// Commit the pending divergent token and regenerate from it.
    ConfirmDivergence,
    /// Drop the pending divergent token.
    CancelDivergence,
    /// Revert the last accepted token without calling the provider.
    Undo,
    /// Re-issue the call that failed, from the current text.
    Retry,
    /// Drop everything and return to idle.
    Reset,
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Intent::Start(_) => "start",
            Intent::AcceptCurrent => "accept",
            Intent::SelectToken(_) => "select a token",
            Intent::NotifyDivergentCandidate(_) => "speculate",
            Intent::ConfirmDivergence => "confirm",
            Intent::CancelDivergence => "cancel",
            Intent::Undo => "undo",
            Intent::Retry => "retry",
            Intent::Reset => "reset",
        }
    }
}
