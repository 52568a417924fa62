//! Conversion orchestration
//!
//! - `types`: request, result and outcome types
//! - `deadline`: the per-request timeout guard
//! - `dispatch`: family routing and the document route table
//! - `pipeline`: admission through artifact, per domain

mod deadline;
mod dispatch;
mod pipeline;
mod types;

pub use deadline::TimeoutGuard;
pub use dispatch::{is_document_route, Dispatcher, DOCUMENT_ROUTES};
pub use pipeline::ConversionPipeline;
pub use types::{ConversionOutcome, ConversionRequest, Converted};
