//! Team assignment and live roster session engine
//!
//! Chat-scoped sessions whose joining members are placed onto balanced
//! teams (one keeper slot plus a fixed number of field slots each), with a
//! privileged full reshuffle and a best-effort mirror of the roster onto an
//! external display surface.

pub mod assignment;
pub mod display;
pub mod error;
pub mod models;
pub mod store;

pub use assignment::{AssignmentEngine, Authorization, EngineEvent, StaticOrganizers};
pub use display::{DisplaySynchronizer, DisplayTransport, MemoryTransport};
pub use error::{EngineError, Result};
pub use models::{Member, Placement, RenderedState, Role, Session, Team};
pub use store::{MemoryStore, SessionStore, SnapshotStore, SqliteStore};
