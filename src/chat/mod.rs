//! Chat loop
//!
//! Accepts one input at a time, checks the session is ready, delegates to
//! the agent executor and records the result in the session history.

pub mod turn;

pub use turn::{check_readiness, ChatLoop, Readiness, TurnOutcome, TurnState};
