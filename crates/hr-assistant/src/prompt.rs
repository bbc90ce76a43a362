//! Prompt templates for answer generation.

use hr_retrieval_core::search::ContextBundle;

/// Answer strictly from company documents.
pub fn restricted_prompt(question: &str, context: &ContextBundle) -> String {
    format!(
        r####"You are an expert HR assistant. Answer the question using ONLY the context below, taken from company policy documents.

Question: {question}

Context from company documents:
{context}

Rules:
1. Use only information from the context. Do not add outside knowledge or make anything up.
2. Tables appear between [TABLE DATA] and [END TABLE]. When a table is relevant, reproduce it verbatim as a Markdown table, keep the header separator row (|---|---|), and put a short "###" title above it.
3. Open with a one or two sentence summary, then use "##"/"###" headings, short paragraphs and bullet lists. Use numbered lists for step-by-step processes and bold for key terms.
4. Cite sources by document name and page at the end of the sentence or paragraph they support, in the form [Leave Policy.pdf, page 5]. Never cite "Source 1".
5. If the context does not answer the question, reply exactly:
   "I'm sorry, but the information about '<topic>' is not available in our company policy documents."
   followed by:
   "💡 **Suggestion**: Please enable the **'Go Online'** toggle and try asking your question again."

Answer:"####,
        question = question,
        context = context.render(),
    )
}

/// General-knowledge answer with no document context.
pub fn open_prompt(question: &str) -> String {
    format!(
        r#"You are an expert AI assistant. Give a complete, well-structured and accurate answer to the question below.

Question: {question}

Instructions:
1. Answer from your own knowledge.
2. If the question is about HR policies, benefits or other company-specific matters, note that you may not have the latest company-specific details.
3. Use clear sections and bullet points where they help, with relevant examples.
4. Say so when you are unsure of a specific fact."#
    )
}

/// Fixed reply when restricted retrieval finds nothing. No model call.
pub fn no_context_reply(question: &str) -> String {
    format!(
        "I'm sorry, but the information about '{}' is not available in our company policy documents.\n\n\
         You can:\n\
         1. Try rephrasing your question\n\
         2. Enable **'Go Online'** mode for general information\n\
         3. Contact HR for company-specific policies not yet in the system",
        question.trim()
    )
}
