pub mod pipeline;

pub use pipeline::{ExportOutcome, ExportPipeline, ExportState};
