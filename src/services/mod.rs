//! Service layer: HTTP core, provider clients, LLM cascade, scoring,
//! workflow machine, agents and the queue runtime.

pub mod agents;
pub mod http;
pub mod llm;
pub mod providers;
pub mod queue;
pub mod scoring;
pub mod workflow;
