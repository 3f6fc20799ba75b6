//! Workflow state machine: session state, events, and the driving engine.

pub mod events;
pub mod machine;
pub mod state;

pub use events::WorkflowEvent;
pub use machine::{
    AnalysisInput, FeedbackInput, RunOutput, WorkflowDeps, WorkflowEngine,
};
pub use state::{
    CollectionStats, FeedbackRating, IntentCategory, SearchIntent, Stage, WorkflowState,
};
