//! Integration Tests
//!
//! End-to-end workflow scenarios driven against stub data sources and a
//! stub (or scripted-cascade) LLM layer, with real storage underneath.

// Shared stubs and engine builders
mod support;

// Full workflow runs: happy path, critical failure, feedback loop, SSE order
mod workflow_test;

// Async queue path: consumer, idempotency, DLQ
mod queue_test;

// LLM cascade failover against scripted providers
mod llm_cascade_test;

// Storage-layer properties over a real SQLite file
mod storage_test;
