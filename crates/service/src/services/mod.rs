//! Email processing stages.

pub mod analyzer;
pub mod classifier;
pub mod orders;
pub mod pipeline;
pub mod responder;

pub use analyzer::{Entity, EntityKind, TextAnalysis, analyze};
pub use classifier::{EmailClassifier, classify_by_keywords, parse_classification};
pub use orders::{ExtractedLine, OrderProcessor, heuristic_lines, parse_extraction};
pub use pipeline::{BatchReport, EmailProcessor};
pub use responder::{Responder, ResponseContext};
