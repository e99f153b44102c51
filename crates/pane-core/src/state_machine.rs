use crate::{
    error::PaneError,
    types::{PaneCommand, PaneEvent, PaneLifecycleState},
};

/// Conversation-pane lifecycle state machine.
///
/// Command-driven transitions go through [`apply`](Self::apply); transitions
/// driven by the completion of an outstanding history fetch go through
/// [`on_history_fetched`](Self::on_history_fetched).
#[derive(Debug, Clone)]
pub struct PaneStateMachine {
    state: PaneLifecycleState,
}

impl Default for PaneStateMachine {
    fn default() -> Self {
        Self {
            state: PaneLifecycleState::Idle,
        }
    }
}

impl PaneStateMachine {
    pub fn state(&self) -> PaneLifecycleState {
        self.state
    }

    pub fn apply(&mut self, command: &PaneCommand) -> Result<Vec<PaneEvent>, PaneError> {
        use PaneCommand::*;

        match command {
            SelectConversation { .. } => self.transition_from_any_of(
                &[
                    PaneLifecycleState::Idle,
                    PaneLifecycleState::Loading,
                    PaneLifecycleState::Live,
                    PaneLifecycleState::Paginating,
                ],
                PaneLifecycleState::Loading,
                "select_conversation",
            ),
            RequestOlderMessages { .. } => self.transition_from_state(
                PaneLifecycleState::Live,
                PaneLifecycleState::Paginating,
                "request_older_messages",
            ),
            RetryHistoryFetch => {
                if self.state == PaneLifecycleState::Loading {
                    Ok(Vec::new())
                } else {
                    Err(PaneError::invalid_state(self.state, "retry_history_fetch"))
                }
            }
            SendTextMessage { .. } | MarkAsRead => {
                if self.state.is_conversation_active() {
                    Ok(Vec::new())
                } else {
                    Err(PaneError::invalid_state(self.state, "conversation command"))
                }
            }
            Shutdown => {
                if self.state == PaneLifecycleState::Terminated {
                    return Ok(Vec::new());
                }
                self.state = PaneLifecycleState::Terminated;
                Ok(vec![PaneEvent::StateChanged {
                    state: PaneLifecycleState::Terminated,
                }])
            }
        }
    }

    /// An outstanding initial or pagination fetch completed.
    pub fn on_history_fetched(&mut self) -> Result<PaneEvent, PaneError> {
        if !matches!(
            self.state,
            PaneLifecycleState::Loading | PaneLifecycleState::Paginating
        ) {
            return Err(PaneError::invalid_state(self.state, "on_history_fetched"));
        }

        self.state = PaneLifecycleState::Live;
        Ok(PaneEvent::StateChanged {
            state: PaneLifecycleState::Live,
        })
    }

    /// An unrecoverable failure ends the pane session.
    pub fn on_fatal(&mut self) -> PaneEvent {
        self.state = PaneLifecycleState::Terminated;
        PaneEvent::StateChanged {
            state: PaneLifecycleState::Terminated,
        }
    }

    fn transition_from_state(
        &mut self,
        expected: PaneLifecycleState,
        next: PaneLifecycleState,
        action: &str,
    ) -> Result<Vec<PaneEvent>, PaneError> {
        if self.state != expected {
            return Err(PaneError::invalid_state(self.state, action));
        }
        self.state = next;
        Ok(vec![PaneEvent::StateChanged { state: next }])
    }

    fn transition_from_any_of(
        &mut self,
        expected: &[PaneLifecycleState],
        next: PaneLifecycleState,
        action: &str,
    ) -> Result<Vec<PaneEvent>, PaneError> {
        if !expected.contains(&self.state) {
            return Err(PaneError::invalid_state(self.state, action));
        }
        self.state = next;
        Ok(vec![PaneEvent::StateChanged { state: next }])
    }
}
