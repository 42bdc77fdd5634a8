//! Prompt composition for retrieval-augmented generation.
//!
//! Pure string building: equal inputs must produce byte-identical output
//! so responses can be snapshot-tested.

use super::knowledge::ScoredDocument;

const CONTEXT_HEADER: &str = "Based on the following knowledge base documents:\n\n";
const NO_DOCUMENTS: &str = "No relevant documents found in the knowledge base.\n\n";
const ANSWER_INSTRUCTION: &str = "Provide a helpful and accurate answer based on the documents above. If the information is not in the documents, you may use general knowledge but indicate that.";

/// Build the generation prompt from the user query and the rank-ordered
/// retrieved documents. Relevance is rendered as a percentage with one
/// decimal place.
pub fn build_prompt(query: &str, documents: &[ScoredDocument]) -> String {
    let mut context = String::from(CONTEXT_HEADER);

    if documents.is_empty() {
        context.push_str(NO_DOCUMENTS);
    } else {
        for (index, doc) in documents.iter().enumerate() {
            context.push_str(&format!(
                "Document {} (Relevance: {:.1}%):\n",
                index + 1,
                doc.similarity * 100.0
            ));
            context.push_str(&doc.content);
            context.push_str("\n\n");
        }
    }

    format!(
        "{}User Question: {}\n\n{}",
        context, query, ANSWER_INSTRUCTION
    )
}
