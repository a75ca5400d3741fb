//! Query-time orchestration: embed -> search -> assemble context, plus the
//! retrieval-quality evaluation harness.

pub mod eval;
pub mod pipeline;

pub use eval::{EvalQuery, EvalReport, Evaluator, QueryEvaluation};
pub use pipeline::{RagPipeline, RagResponse, ResponseMetadata, SharedStore};
