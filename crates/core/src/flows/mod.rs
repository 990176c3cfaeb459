pub mod transition;

pub use transition::{
    apply_decision, cancel, claim_execution, complete_execution, open_request,
    release_abandoned_claim, release_execution_claim, Decision, DecisionInput, NewRequest, TransitionError,
    TransitionOutcome,
};
