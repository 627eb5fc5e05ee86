//! Persistence layer — the `Store` trait and its backends.

pub mod libsql_backend;
pub mod memory;
pub mod migrations;
pub mod records;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use memory::MemoryStore;
pub use records::{AnalysisRecord, BranchInfo, ContentRecord, Membership, UserProfile};
pub use traits::Store;
