pub mod extractor;
pub mod graph_builder;

pub use extractor::{EntityExtractor, ExtractedEntity, ExtractedRelation, ExtractionResult};
pub use graph_builder::{GraphBuilder, GraphIngestOutcome};
