mod hierarchy;
mod ingest;
mod preview;
mod types;

pub use hierarchy::*;
pub use ingest::*;
pub use preview::*;
pub use types::*;
