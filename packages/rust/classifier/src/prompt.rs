//! Prompt rendering for batch screening.

use std::fmt::Write;

use litscreen_shared::BatchItem;

/// Instructions followed by one delimited block per item.
///
/// Item ids are rendered verbatim so decisions can be joined back by id.
pub fn render_batch_prompt(instructions: &str, items: &[BatchItem]) -> String {
    let mut prompt = format!("{}\n\nDATA TO ANALYZE:\n", instructions.trim_end());
    for item in items {
        let _ = write!(
            prompt,
            "--- PAPER ID: {} ---\nTitle: {}\nAbstract: {}\n\n",
            item.id, item.title, item.abstract_text
        );
    }
    prompt
}
