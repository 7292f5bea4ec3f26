pub mod engine;
pub mod states;

pub use engine::{FlowTransitionError, TurnFlowEngine};
pub use states::{TransitionOutcome, TurnAction, TurnContext, TurnEvent, TurnState};
