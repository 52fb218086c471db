pub mod commands;
pub mod engine;
pub mod interrupt;
pub mod states;

pub use commands::DialogCommand;
pub use engine::{DialogEngine, FlowDefinition, FlowTransitionError, SupportRequestFlow};
pub use interrupt::{intercept, resume_prompt, Interrupt};
pub use states::{
    AttachmentCheck, DialogState, FlowAction, FlowContext, FlowEvent, FlowGraph, Prompt,
    TransitionOutcome, UnknownDialogState,
};
