//! Agent Runtime - model-facing turn processing for the Soof shop assistant
//!
//! This crate drives one chat turn end to end:
//! - Classifies the customer's intent and picks a handler (`router`)
//! - Runs the agent/tool loop against the shop catalog (`tools`)
//! - Gates catalog-backed drafts on health-claim compliance and rewrites
//!   violating drafts a bounded number of times (`regeneration`)
//! - Persists the turn and its audit evidence through a `ThreadStore`
//!
//! # Key Types
//!
//! - `AgentRuntime` - turn orchestrator (see `runtime` module)
//! - `LlmClient` - pluggable chat-completion adapter (OpenAI-compatible, scripted)
//! - `PineconeClaimRetriever` - claim similarity search for the compliance gate
//!
//! # Safety Principle
//!
//! The LLM is strictly a translator. It NEVER decides whether a reply is
//! compliant. Verdicts are computed deterministically in `soof-core` from
//! retrieval scores.

pub mod llm;
pub mod prompts;
pub mod regeneration;
pub mod retrieval;
pub mod router;
pub mod runtime;
pub mod tools;

pub use llm::{LlmClient, LlmError, ModelRequest, OpenAiCompatibleClient, ScriptedLlmClient};
pub use regeneration::RegenerationController;
pub use retrieval::PineconeClaimRetriever;
pub use router::{dispatch, Handler, IntentRouter, RouteDecision};
pub use runtime::{AgentRuntime, RuntimeSettings};
pub use tools::{Tool, ToolContext, ToolError, ToolRegistry};
