//! CLI command implementations.

mod config;
mod ingest;
mod navigate;
mod partitions;
mod project;
mod quota;
mod retention;
mod stack;
mod tenant;

pub use config::ConfigCmd;
pub use ingest::IngestCmd;
pub use navigate::NavigateCmd;
pub use partitions::PartitionsCmd;
pub use project::ProjectCmd;
pub use quota::QuotaCmd;
pub use retention::RetentionCmd;
pub use stack::StackCmd;
pub use tenant::TenantCmd;
