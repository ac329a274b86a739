//! History trimming and prompt assembly

use super::count_tokens;
use crate::api::{Message, Role};

/// "role: content", the unit history costs are measured in
pub fn history_line(message: &Message) -> String {
    format!("{}: {}", message.role, message.content)
}

pub fn message_tokens(message: &Message) -> usize {
    count_tokens(&history_line(message))
}

/// Keep the most recent messages that fit in `token_budget`.
///
/// Walks from newest to oldest and stops at the first message that would push
/// the running total over budget. The newest message is always kept, even if
/// it alone is over budget. When anything was dropped, a system marker saying
/// how many messages were omitted is put first; the marker is not counted
/// against the budget.
pub fn optimize_history(messages: &[Message], token_budget: usize) -> Vec<Message> {
    let mut kept: Vec<Message> = Vec::new();
    let mut used = 0;

    for message in messages.iter().rev() {
        let cost = message_tokens(message);
        if !kept.is_empty() && used + cost > token_budget {
            break;
        }
        used += cost;
        kept.push(message.clone());
    }

    kept.reverse();

    let omitted = messages.len() - kept.len();
    if omitted > 0 {
        kept.insert(0, omitted_marker(omitted));
    }

    kept
}

pub fn omitted_marker(count: usize) -> Message {
    let noun = if count == 1 { "message" } else { "messages" };
    Message::system(format!("[{} earlier {} omitted]", count, noun))
}

pub fn is_omitted_marker(message: &Message) -> bool {
    message.role == Role::System
        && message.content.starts_with('[')
        && message.content.ends_with("omitted]")
}

/// Cut to at most `max_chars` characters, marking the cut
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

/// "Conversation so far:" block with every line capped at `line_chars`
pub fn history_section(history: &[Message], line_chars: usize) -> Option<String> {
    if history.is_empty() {
        return None;
    }
    let lines: Vec<String> = history
        .iter()
        .map(|m| format!("{}: {}", m.role, truncate_chars(&m.content, line_chars)))
        .collect();
    Some(format!("Conversation so far:\n{}", lines.join("\n")))
}

/// Prompt split into the system half (preamble, context) and the user half
/// (history, query)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptParts {
    pub system: String,
    pub user: String,
}

impl PromptParts {
    /// Both halves as one text, the form usage is measured on
    pub fn text(&self) -> String {
        format!("{}\n\n{}", self.system, self.user)
    }
}

pub fn assemble_parts(
    preamble: &str,
    context_lines: &[String],
    history: &[Message],
    line_chars: usize,
    query: &str,
) -> PromptParts {
    let mut system = preamble.to_string();
    if !context_lines.is_empty() {
        system.push_str("\n\n");
        system.push_str(&context_lines.join("\n"));
    }

    let mut user = String::new();
    if let Some(section) = history_section(history, line_chars) {
        user.push_str(&section);
        user.push_str("\n\n");
    }
    user.push_str("User: ");
    user.push_str(query);

    PromptParts { system, user }
}

/// Assemble preamble, context, trimmed history and the user query
pub fn assemble_prompt(
    preamble: &str,
    context_lines: &[String],
    history: &[Message],
    line_chars: usize,
    query: &str,
) -> String {
    assemble_parts(preamble, context_lines, history, line_chars, query).text()
}
