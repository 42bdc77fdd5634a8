pub mod knowledge;
pub mod prompt;
pub mod provider;
pub mod service;
pub mod similarity;

pub use knowledge::{
    BulkDocument, DocumentRef, KnowledgeDocument, KnowledgeStats, KnowledgeStore, NewKnowledge,
    ScoredDocument,
};
pub use provider::{ModelError, ModelHealth, ModelProvider};
pub use service::{QueryOutcome, RagConfig, RagError, RagService};
