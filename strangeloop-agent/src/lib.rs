//! # strangeloop agent
//!
//! The dispatcher between a natural-language request and the registry:
//! 1. List the capabilities reachable in this process
//! 2. Ask the model which action fits: use one, create one, or answer directly
//! 3. Carry out that single action and report the outcome
//!
//! Every run is one decision; there is no loop and no memory between runs.

mod agent;
mod plan;
mod prompt;

pub use agent::{Agent, AgentConfig, Creation, Outcome};
pub use plan::ActionPlan;
pub use prompt::{decision_prompt, run_command};
