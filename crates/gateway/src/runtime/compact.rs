//! Mechanical context compaction and tool-result truncation.
//!
//! Both operations are pure and independent of the provider or the tool
//! loop — they only ever look at the message list (or a single string) in
//! front of them, which is what makes them unit-testable against worked
//! scenarios without a live LLM.

use sa_domain::tool::{ContentPart, Message, MessageContent, Role};

pub const MAIN_MAX_CONTEXT_MESSAGES: usize = 30;
pub const SUBAGENT_MAX_CONTEXT_MESSAGES: usize = 25;

pub const MAIN_MAX_TOOL_RESULT_CHARS: usize = 3000;
pub const SUBAGENT_MAX_TOOL_RESULT_CHARS: usize = 2000;

/// Compact `messages` down to at most `max_messages` entries.
///
/// Always keeps `messages[0]` (the system prompt) and `messages[1]` (the
/// first user message) when present, then takes the tail of the remaining
/// history under a budget of `max_messages - 2`. A leading orphaned
/// `role: tool` record at the start of that tail — a tool result whose
/// owning `assistant` tool-call message fell just outside the window — is
/// dropped, since a dangling tool result with no matching tool call would
/// confuse the provider.
pub fn compact_main(messages: &[Message], max_messages: usize) -> Vec<Message> {
    if messages.len() <= max_messages {
        return messages.to_vec();
    }
    if max_messages <= 2 || messages.len() < 2 {
        return messages.to_vec();
    }

    let head = &messages[..2.min(messages.len())];
    let rest = &messages[2..];
    let budget = max_messages.saturating_sub(2);
    let tail_start = rest.len().saturating_sub(budget);
    let mut tail = &rest[tail_start..];

    while tail.first().is_some_and(|m| m.role == Role::Tool) {
        tail = &tail[1..];
    }

    let mut out = Vec::with_capacity(head.len() + tail.len());
    out.extend_from_slice(head);
    out.extend_from_slice(tail);
    out
}

/// Subagent compaction. Groups each
/// `assistant{tool_calls}` with its following `tool` messages into an
/// atomic block before dropping from the oldest end, so a tool call and
/// its result are never split across the compaction boundary.
pub fn compact_subagent(messages: &[Message], max_messages: usize) -> Vec<Message> {
    if messages.len() <= max_messages {
        return messages.to_vec();
    }
    if max_messages <= 2 || messages.len() < 2 {
        return messages.to_vec();
    }

    let head = &messages[..2.min(messages.len())];
    let rest = &messages[2..];

    let blocks = group_into_blocks(rest);
    let budget = max_messages.saturating_sub(2);

    let mut kept_blocks: Vec<&[Message]> = Vec::new();
    let mut count = 0usize;
    for block in blocks.iter().rev() {
        if count + block.len() > budget {
            break;
        }
        count += block.len();
        kept_blocks.push(block);
    }
    kept_blocks.reverse();

    let mut out = Vec::with_capacity(head.len() + count);
    out.extend_from_slice(head);
    for block in kept_blocks {
        out.extend_from_slice(block);
    }
    out
}

/// Split a message slice into atomic blocks: a single non-tool-call
/// message is its own block; an `assistant` message carrying tool calls
/// is grouped with every contiguous `tool` message that follows it.
fn group_into_blocks(messages: &[Message]) -> Vec<&[Message]> {
    let mut blocks = Vec::new();
    let mut i = 0;
    while i < messages.len() {
        if messages[i].role == Role::Assistant && has_tool_use(&messages[i]) {
            let mut j = i + 1;
            while j < messages.len() && messages[j].role == Role::Tool {
                j += 1;
            }
            blocks.push(&messages[i..j]);
            i = j;
        } else {
            blocks.push(&messages[i..i + 1]);
            i += 1;
        }
    }
    blocks
}

fn has_tool_use(msg: &Message) -> bool {
    match &msg.content {
        MessageContent::Parts(parts) => parts.iter().any(|p| matches!(p, ContentPart::ToolUse { .. })),
        MessageContent::Text(_) => false,
    }
}

const JSON_TRUNCATION_SENTINEL: &str =
    "[JSON truncated \u{2014} showed {shown} of {total} chars. Do NOT re-run this tool to see more.]";
const TEXT_TRUNCATION_SENTINEL: &str =
    "[truncated \u{2014} showed {shown} of {total} chars. Do NOT re-run this tool to see more.]";

/// Truncate a tool result to `max_chars`.
///
/// ANSI escape sequences are stripped first. Results already within
/// budget pass through untouched. JSON-shaped content (starts with `{` or
/// `[` once stripped and trimmed) is prefix-truncated at a JSON-aware
/// boundary; anything else gets a head+tail truncation so both ends of
/// the original text remain visible.
pub fn truncate_tool_result(raw: &str, max_chars: usize) -> String {
    let stripped = strip_ansi(raw);
    if stripped.chars().count() <= max_chars {
        return stripped;
    }

    let trimmed = stripped.trim_start();
    let looks_like_json = trimmed.starts_with('{') || trimmed.starts_with('[');

    let pretty = looks_like_json
        .then(|| serde_json::from_str::<serde_json::Value>(trimmed).ok())
        .flatten()
        .and_then(|v| serde_json::to_string_pretty(&v).ok());

    if let Some(pretty) = pretty {
        let total = pretty.chars().count();
        let keep = max_chars.saturating_sub(1);
        let prefix = take_chars(&pretty, keep);
        let sentinel = JSON_TRUNCATION_SENTINEL
            .replace("{shown}", &keep.to_string())
            .replace("{total}", &total.to_string());
        format!("{prefix}\n{sentinel}")
    } else {
        let total = stripped.chars().count();
        let half = max_chars / 2;
        let head = take_chars(&stripped, half);
        let tail = take_last_chars(&stripped, max_chars - half);
        let sentinel = TEXT_TRUNCATION_SENTINEL
            .replace("{shown}", &max_chars.to_string())
            .replace("{total}", &total.to_string());
        format!("{head}\n{sentinel}\n{tail}")
    }
}

fn take_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

fn take_last_chars(s: &str, n: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    let start = chars.len().saturating_sub(n);
    chars[start..].iter().collect()
}

/// Strip ANSI CSI escape sequences (`\x1b[...<letter>`).
fn strip_ansi(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' && chars.peek() == Some(&'[') {
            chars.next();
            for next in chars.by_ref() {
                if next.is_ascii_alphabetic() {
                    break;
                }
            }
            continue;
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::tool::ToolCall;

    fn user(n: usize) -> Message {
        Message::user(format!("u{n}"))
    }
    fn assistant(n: usize) -> Message {
        Message::assistant(format!("a{n}"))
    }

    #[test]
    fn no_compaction_below_budget() {
        let messages: Vec<Message> = (0..5).map(user).collect();
        let out = compact_main(&messages, 30);
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn keeps_system_and_first_user_always() {
        let mut messages = vec![Message::system("sys"), Message::user("first")];
        for i in 0..40 {
            messages.push(user(i));
            messages.push(assistant(i));
        }
        let out = compact_main(&messages, 30);
        assert_eq!(out.len(), 30);
        assert_eq!(out[0].content.text(), Some("sys"));
        assert_eq!(out[1].content.text(), Some("first"));
    }

    #[test]
    fn drops_leading_orphan_tool_message() {
        let mut messages = vec![Message::system("sys"), Message::user("first")];
        for i in 0..40 {
            messages.push(assistant(i));
            messages.push(user(i));
        }
        // Force a tool message right at the computed tail boundary.
        messages.insert(messages.len() - 28, Message::tool_result("call-x", "orphaned"));
        let out = compact_main(&messages, 30);
        assert!(out.get(2).map(|m| m.role != Role::Tool).unwrap_or(true));
    }

    #[test]
    fn stability_recompacting_is_idempotent() {
        let mut messages = vec![Message::system("sys"), Message::user("first")];
        for i in 0..40 {
            messages.push(user(i));
            messages.push(assistant(i));
        }
        let once = compact_main(&messages, 30);
        let twice = compact_main(&once, 30);
        assert_eq!(once.len(), twice.len());
        assert_eq!(once[0].content.text().map(str::to_owned), twice[0].content.text().map(str::to_owned));
    }

    fn assistant_with_tool(n: usize) -> Message {
        let tc = ToolCall {
            call_id: format!("c{n}"),
            tool_name: "exec".into(),
            arguments: serde_json::json!({}),
        };
        Message {
            role: Role::Assistant,
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: format!("a{n}") },
                ContentPart::ToolUse {
                    id: tc.call_id.clone(),
                    name: tc.tool_name,
                    input: tc.arguments,
                },
            ]),
        }
    }

    #[test]
    fn subagent_compaction_preserves_tool_call_pairing() {
        let mut messages = vec![Message::system("sys"), Message::user("first")];
        for i in 0..20 {
            messages.push(user(i));
            messages.push(assistant_with_tool(i));
            messages.push(Message::tool_result(&format!("c{i}"), &format!("result {i}")));
        }
        let out = compact_subagent(&messages, 10);
        // Every assistant-with-tool-use in the output must be followed by its tool result.
        for (idx, msg) in out.iter().enumerate() {
            if msg.role == Role::Assistant && has_tool_use(msg) {
                assert!(out.get(idx + 1).is_some_and(|m| m.role == Role::Tool));
            }
        }
    }

    #[test]
    fn truncate_below_budget_is_unchanged() {
        let s = "short text";
        assert_eq!(truncate_tool_result(s, 3000), s);
    }

    #[test]
    fn truncate_json_keeps_prefix_and_sentinel() {
        let big = format!("{{\"data\": \"{}\"}}", "x".repeat(5000));
        let out = truncate_tool_result(&big, 100);
        assert!(out.starts_with("{\n"));
        assert!(out.contains("\"data\""));
        assert!(out.contains("JSON truncated"));
        assert!(out.contains("Do NOT re-run this tool"));
    }

    #[test]
    fn truncate_unparseable_json_like_text_falls_back_to_head_tail() {
        let big = format!("{{not actually json {}", "x".repeat(5000));
        let out = truncate_tool_result(&big, 100);
        assert!(out.starts_with("{not"));
        assert!(out.contains("truncated"));
        assert!(!out.contains("JSON truncated"));
    }

    #[test]
    fn truncate_plain_text_keeps_head_and_tail() {
        let big = format!("HEAD{}TAIL", "x".repeat(5000));
        let out = truncate_tool_result(&big, 100);
        assert!(out.starts_with("HEAD"));
        assert!(out.ends_with("TAIL"));
        assert!(out.contains("truncated"));
    }

    #[test]
    fn truncate_strips_ansi_before_measuring() {
        let s = "\u{1b}[31mred\u{1b}[0m text";
        let out = truncate_tool_result(s, 3000);
        assert_eq!(out, "red text");
    }

    #[test]
    fn truncate_is_length_bounded() {
        let big = "y".repeat(10_000);
        let out = truncate_tool_result(&big, 500);
        assert!(out.chars().count() < big.chars().count());
    }
}
