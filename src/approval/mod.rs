// ABOUTME: Approval module — the out-of-band human-in-the-loop rendezvous for gated tool calls.

pub mod manager;
pub mod types;

pub use manager::ApprovalManager;
pub use types::{ApprovalDecision, ApprovalOutcome, ApprovalRecord, ApprovalRequest};
