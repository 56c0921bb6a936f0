//! Session state and lifecycle
//!
//! - `store` - the five state slots
//! - `lifecycle` - events that invalidate slots
//! - `context` - one user's session, wiring the store to its collaborators

pub mod context;
pub mod lifecycle;
pub mod store;

pub use context::SessionContext;
pub use lifecycle::{apply, LifecycleEvent, ResetPlan};
pub use store::{Message, Role, SessionStore, Slot, StoreStatus};
