//! Typed replies produced by the conversation state machine.

use crate::action::ChatAction;

/// A button-like choice offered to the user. The external menu layer
/// renders the label and sends back the attached action verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyOption {
    pub label: String,
    pub action: ChatAction,
}

impl ReplyOption {
    pub fn new(label: impl Into<String>, action: ChatAction) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

/// Whether the flow is still collecting input after this reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The flow stays active and expects another action.
    Continue,
    /// The flow finished: confirmed, cancelled, or aborted on error.
    Ended,
}

/// One step's output: the text to show and the choices to offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReply {
    pub text: String,
    pub options: Vec<ReplyOption>,
    pub outcome: StepOutcome,
}

impl StepReply {
    /// A reply that keeps the flow open.
    pub fn prompt(text: impl Into<String>, options: Vec<ReplyOption>) -> Self {
        Self {
            text: text.into(),
            options,
            outcome: StepOutcome::Continue,
        }
    }

    /// A terminal reply: the flow is over.
    pub fn ended(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            options: Vec::new(),
            outcome: StepOutcome::Ended,
        }
    }

    pub fn is_ended(&self) -> bool {
        self.outcome == StepOutcome::Ended
    }
}
