//! Response interpreter: backend answer -> conversation transition + reply text.

use crate::backend::{BackendResponse, DialogState};

/// Effect of a backend answer on the room's conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Start,
    Stop,
    Unchanged,
}

impl Transition {
    pub fn for_state(state: Option<DialogState>) -> Self {
        match state {
            Some(DialogState::ConfirmIntent | DialogState::ElicitSlot) => Transition::Start,
            Some(
                DialogState::ElicitIntent
                | DialogState::Failed
                | DialogState::Fulfilled
                | DialogState::ReadyForFulfillment,
            ) => Transition::Stop,
            Some(DialogState::Unknown) | None => Transition::Unchanged,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpretation {
    pub transition: Transition,
    /// Text to send to the room; None means stay silent.
    pub reply: Option<String>,
}

pub fn interpret(response: &BackendResponse) -> Interpretation {
    let reply = response
        .message
        .as_ref()
        .filter(|m| !m.trim().is_empty())
        .cloned();
    Interpretation {
        transition: Transition::for_state(response.dialog_state),
        reply,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(state: Option<DialogState>, message: Option<&str>) -> BackendResponse {
        BackendResponse {
            dialog_state: state,
            message: message.map(String::from),
        }
    }

    #[test]
    fn start_states() {
        for s in [DialogState::ConfirmIntent, DialogState::ElicitSlot] {
            assert_eq!(interpret(&response(Some(s), None)).transition, Transition::Start);
        }
    }

    #[test]
    fn stop_states() {
        for s in [
            DialogState::ElicitIntent,
            DialogState::Failed,
            DialogState::Fulfilled,
            DialogState::ReadyForFulfillment,
        ] {
            assert_eq!(interpret(&response(Some(s), None)).transition, Transition::Stop);
        }
    }

    #[test]
    fn unknown_or_absent_state_is_unchanged() {
        assert_eq!(interpret(&response(None, Some("hi"))).transition, Transition::Unchanged);
        assert_eq!(
            interpret(&response(Some(DialogState::Unknown), None)).transition,
            Transition::Unchanged
        );
    }

    #[test]
    fn reply_only_when_message_non_empty() {
        assert_eq!(
            interpret(&response(None, Some("Are you sure?"))).reply.as_deref(),
            Some("Are you sure?")
        );
        assert!(interpret(&response(None, Some("  "))).reply.is_none());
        assert!(interpret(&response(None, None)).reply.is_none());
    }
}
