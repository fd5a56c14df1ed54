// State machine module for batch orchestration
//
// Batch lifecycle transitions are computed by a pure transition table and
// persisted with compare-and-swap writes against the batch store.

pub mod batch_state_machine;
pub mod errors;
pub mod events;
pub mod states;

// Re-export main types for convenient access
pub use batch_state_machine::{BatchStateMachine, TransitionOutcome};
pub use errors::{StateMachineError, StateMachineResult};
pub use events::BatchEvent;
pub use states::{BatchState, RowState};
