//! Team assignment: the session engine, placement rules, and the
//! authorization capability its privileged operations consume.

pub mod authorization;
pub mod engine;
pub mod placement;

pub use authorization::{AuthError, Authorization, StaticOrganizers};
pub use engine::{AssignmentEngine, EngineEvent};
