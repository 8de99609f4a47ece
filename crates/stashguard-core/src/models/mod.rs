//! Data models for the pipeline
//!
//! File identity, versions, access records, security verdicts, domain events
//! and the job payloads handed to the task queue.

mod access;
mod events;
mod file;
mod presign;
mod security;
mod task;
mod upload;
mod version;

pub use access::*;
pub use events::*;
pub use file::*;
pub use presign::*;
pub use security::*;
pub use task::*;
pub use upload::*;
pub use version::*;
