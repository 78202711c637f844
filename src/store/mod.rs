//! Persistence layer.

mod libsql_backend;
mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{BidRecord, BlockedAudit, Database, DeliveredMessage};
