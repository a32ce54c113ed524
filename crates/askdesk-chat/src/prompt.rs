//! Prompt assembly for grounded answers.

use askdesk_resolve::SearchHit;
use askdesk_session::{ChatMessage, Role};

use crate::types::PromptMessage;

/// Max characters of each record's content placed in the context block.
pub const SNIPPET_CHARS: usize = 1200;

pub const SYSTEM_INSTRUCTION: &str = "You are the help desk assistant for this website. \
Answer only from the reference records provided below. \
When the records do not contain the answer, \
say that you do not know and suggest contacting the staff. \
Never invent prices, dates, schedules, or policies. \
Reply in the language of the user's question and keep answers short.";

pub const NO_GROUNDING_NOTICE: &str = "No reference records matched this question. \
Tell the user you could not find this information on the site and suggest contacting the staff. \
Do not guess.";

/// Build the provider conversation: system instruction with context, the
/// recent history, then the new user message.
pub fn build_messages(
    hits: &[SearchHit],
    history: &[ChatMessage],
    user_message: &str,
) -> Vec<PromptMessage> {
    let system_prompt = if hits.is_empty() {
        format!("{}\n\n{}", SYSTEM_INSTRUCTION, NO_GROUNDING_NOTICE)
    } else {
        format!("{}\n\nReference records:\n\n{}", SYSTEM_INSTRUCTION, context_block(hits))
    };

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(PromptMessage::new("system", system_prompt));
    for msg in history {
        let role = match msg.role {
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        messages.push(PromptMessage::new(role, msg.content.clone()));
    }
    messages.push(PromptMessage::new("user", user_message));
    messages
}

fn context_block(hits: &[SearchHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            let mut header = format!("[{}] ({}) {}", i + 1, hit.doc_type, hit.title);
            if !hit.url.is_empty() {
                header.push_str(" — ");
                header.push_str(&hit.url);
            }
            format!("{}\n{}", header, truncate_chars(&hit.content, SNIPPET_CHARS))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
