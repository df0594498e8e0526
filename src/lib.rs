pub mod config;
pub mod error;
pub mod identity;
pub mod ingest;
pub mod record;
pub mod schema;
pub mod store;

pub use config::IngestConfig;
pub use error::{IdentityError, IngestError, ParseError, RunHalted, StoreError};
pub use ingest::{FileOutcome, IngestSummary, SkipReason, run_ingest};
