/// Syncer lifecycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncerState {
    /// Timers are not running. Queued work may still be draining.
    #[default]
    Stopped,

    /// Enqueue and verification timers are armed.
    Running,

    /// Queues are closed. The syncer cannot be started again.
    Closed,
}

impl SyncerState {
    /// Check if a transition to the target state is valid.
    pub fn can_transition_to(&self, target: SyncerState) -> bool {
        match self {
            SyncerState::Stopped => matches!(target, SyncerState::Running | SyncerState::Closed),
            SyncerState::Running => matches!(target, SyncerState::Stopped | SyncerState::Closed),
            SyncerState::Closed => false,
        }
    }
}
