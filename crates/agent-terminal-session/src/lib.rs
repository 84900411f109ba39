//! Command routing, shared workspace and agent lifecycle.
//!
//! Provides:
//! - `TerminalRouter` - Classify and dispatch commands, relay between terminals
//! - `WorkspaceService` - Files and tasks with broadcast-on-change
//! - `LifecycleManager` - Spawn and list agent containers
//! - Store implementations (memory)

pub mod lifecycle;
pub mod router;
pub mod storage;
pub mod workspace;

pub use lifecycle::{LifecycleError, LifecycleManager};
pub use router::{CommandEvent, Outcome, RelayError, Routed, TerminalRouter};
pub use workspace::{WorkspaceError, WorkspaceService};
