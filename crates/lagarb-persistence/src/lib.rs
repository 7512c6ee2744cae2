//! Append-only event log for lagarb.
//!
//! Records every divergence snapshot, edge decision and risk verdict as
//! JSON Lines in daily files for post-analysis.

pub mod error;
pub mod record;
pub mod writer;

pub use error::{PersistenceError, PersistenceResult};
pub use record::{EventRecord, EventType};
pub use writer::EventLogWriter;
