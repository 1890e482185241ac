// ABOUTME: Session module — in-memory conversation state plus its trust-level classification.
// ABOUTME: Durable persistence lives in the sibling `store` module, not here.

pub mod context;

pub use context::{SessionContext, SessionType};
