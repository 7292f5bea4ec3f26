pub mod audit;
pub mod compliance;
pub mod config;
pub mod context;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod history;
pub mod routing;
pub mod store;
pub mod turn;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
pub use compliance::{
    classify_claims, ClaimRetriever, ComplianceCheck, ComplianceEvaluator, RetrievalError,
    StaticClaimRetriever,
};
pub use context::{build_context, ContextWindowBuilder};
pub use domain::claims::{ClaimRecord, ClaimType, ClaimsValidationResult};
pub use domain::intent::{Intent, IntentClassification};
pub use domain::message::{Message, Role, ToolCall};
pub use domain::thread::ThreadId;
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{TurnEvent, TurnFlowEngine, TurnState};
pub use history::History;
pub use routing::RoutingConfig;
pub use store::{InMemoryThreadStore, StoreError, ThreadStore, TurnAudit, TurnRecord};
pub use turn::{ComplianceResolution, Conversation, TurnOutcome};
