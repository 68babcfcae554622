//! Turn identity and stage model

/// Monotonic identifier for one interaction turn
///
/// Every asynchronous continuation re-checks its originating turn id against
/// the orchestrator's active id before applying any effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TurnId(pub u64);

impl std::fmt::Display for TurnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "turn-{}", self.0)
    }
}

/// Stage of an interaction turn
///
/// `Idle` is the rest state between turns; `Done`, `Error`, and `Cancelled`
/// are terminal for a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// No turn in progress
    Idle,
    /// Microphone held, capturing audio
    Recording,
    /// Recording handed to the transcription provider
    Transcribing,
    /// Photo bytes moving to durable storage
    Uploading,
    /// Vision model answering the question
    Analyzing,
    /// Speaker held, audible playback in progress
    Speaking,
    /// Turn completed normally
    Done,
    /// Turn ended on an unrecoverable provider failure
    Error,
    /// Turn superseded or abandoned
    Cancelled,
}

impl Stage {
    /// Whether this stage ends the turn
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Cancelled)
    }
}

/// Read-only projection of the orchestrator's current turn and stage
///
/// Consumers subscribe to snapshots; they never mutate orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnSnapshot {
    pub turn: TurnId,
    pub stage: Stage,
}
