//! Prompt composition.

/// Sentence the model must reply with when the context lacks the answer.
/// Downstream code matches on it byte for byte.
pub const REFUSAL_SENTENCE: &str =
    "I don't have information about that in my knowledge base.";

/// Line placed before every passage.
pub const PASSAGE_MARKER: &str = "<<<passage>>>";

/// Line closing the context section.
pub const END_CONTEXT_MARKER: &str = "<<<end of context>>>";

const INSTRUCTION: &str = "Answer the question below using strictly the context provided. \
Do not use any other knowledge.";

/// Build the prompt sent to the generator.
///
/// Without context (`None` or an empty slice) the query is returned
/// unchanged. Otherwise the passages are wrapped in an instruction that
/// restricts the answer to them and names [`REFUSAL_SENTENCE`] as the reply
/// when they do not contain the answer.
///
/// # Examples
///
/// ```
/// use groundrag::prompt::{compose, REFUSAL_SENTENCE};
///
/// assert_eq!(compose("hi?", None), "hi?");
///
/// let prompt = compose("How much is B?", Some(&["B costs $50"]));
/// assert!(prompt.contains("B costs $50"));
/// assert!(prompt.contains(REFUSAL_SENTENCE));
/// ```
pub fn compose(query: &str, contexts: Option<&[&str]>) -> String {
    let contexts = match contexts {
        Some(c) if !c.is_empty() => c,
        _ => return query.to_string(),
    };

    let mut prompt = String::new();
    prompt.push_str(INSTRUCTION);
    prompt.push('\n');
    prompt.push_str("If the answer is not in the context, reply exactly: \"");
    prompt.push_str(REFUSAL_SENTENCE);
    prompt.push_str("\"\n\nContext:\n");

    for passage in contexts {
        prompt.push_str(PASSAGE_MARKER);
        prompt.push('\n');
        prompt.push_str(strip_markers(passage).trim());
        prompt.push('\n');
    }
    prompt.push_str(END_CONTEXT_MARKER);
    prompt.push_str("\n\nQuestion: ");
    prompt.push_str(query);
    prompt
}

/// Whether a generated answer is the refusal.
pub fn is_refusal(answer: &str) -> bool {
    answer.contains(REFUSAL_SENTENCE)
}

// Passages must not be able to fake a boundary. Removing one marker can
// join its neighbors into a new one, so repeat until nothing changes.
fn strip_markers(passage: &str) -> String {
    let mut text = passage.to_string();
    loop {
        let stripped = text
            .replace(PASSAGE_MARKER, "")
            .replace(END_CONTEXT_MARKER, "");
        if stripped == text {
            return text;
        }
        text = stripped;
    }
}
