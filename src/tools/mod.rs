// ABOUTME: Tool registry module — the pluggable capability surface the reasoning loop dispatches onto.
// ABOUTME: Concrete tools live alongside the registry; only `echo` ships as a reference implementation.

pub mod echo;
pub mod registry;

pub use echo::EchoTool;
pub use registry::{PolicyCheck, Registry, Tool, ToolPolicy, ToolResult};
