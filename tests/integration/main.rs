//! Integration Tests
//!
//! End-to-end coverage of the turn pipeline (scoring, selection,
//! fallback, cancellation, event ordering), the LLM backends against a
//! mock HTTP server, and the HTTP surface.

mod common;

// Turn pipeline: happy path, fail path, equivalence, SLA fallback,
// cancellation, event ordering
mod turn_pipeline_test;

// LLM backends against wiremock endpoints
mod llm_backend_test;

// HTTP surface: routes, validation errors, aggregation
mod http_api_test;
