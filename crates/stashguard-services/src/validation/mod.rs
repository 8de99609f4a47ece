//! Upload validation: format, content and heuristic checks, and the pipeline that runs them.

pub mod content;
pub mod format;
pub mod heuristics;
pub mod pipeline;

pub use content::{ContentError, ContentValidator};
pub use format::{FormatError, FormatValidator};
pub use heuristics::{BehavioralHeuristics, HeuristicFinding, HeuristicReport};
pub use pipeline::{
    ContentStage, FormatStage, HeuristicStage, RateLimitStage, SecurityValidationPipeline,
    ValidationContext, ValidationStage, VirusScanStage, UPLOAD_OPERATION,
};
