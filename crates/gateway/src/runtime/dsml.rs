//! DSML fallback tool-call encoding.
//!
//! Some models, when offered tools but not asked to stream, fall back to
//! writing an invocation inline in prose instead of using the provider's
//! native tool-call channel:
//!
//! ```text
//! <|DSML|invoke name="read_file">
//! <|DSML|parameter name="path">notes.md</|DSML|parameter>
//! <|DSML|invoke>
//! ```
//!
//! `|` (U+007C) and the fullwidth `｜` (U+FF5C) are both accepted, and
//! matching is case-insensitive, since different models render the
//! delimiter differently. Each invoke block opens at `invoke name="..."`
//! and runs until the next invoke opener or the end of the content.
//!
//! Case-folding uses `to_ascii_lowercase`, not `to_lowercase`: every
//! delimiter and keyword this parser looks for is ASCII, and byte offsets
//! found in the folded copy are used to slice the *original* string.
//! `str::to_lowercase()` is full-Unicode and can change a string's byte
//! length (e.g. `İ` U+0130 is 2 bytes but lowercases to a 3-byte
//! sequence), which would desync those offsets and slice the original
//! mid-character. `to_ascii_lowercase` only touches `A`-`Z`, so it's
//! byte-length-preserving and the offsets stay valid.

use sa_domain::tool::ToolCall;

/// Quick pre-check: does `content` look like it might contain a DSML
/// block at all? Cheap enough to run on every assistant response before
/// bothering with the real parse.
pub fn looks_like_dsml(content: &str) -> bool {
    let lower = content.to_ascii_lowercase();
    lower.contains("invoke") && lower.contains("dsml")
}

/// Parse every `invoke` block out of `content` and synthesize
/// [`ToolCall`]s for them, with `dsml_`-prefixed call ids (`dsml_0`,
/// `dsml_1`, ...). Returns an empty vec if no well-formed invoke block is
/// found — callers should fall back to treating `content` as plain text
/// in that case.
pub fn parse_dsml_tool_calls(content: &str) -> Vec<ToolCall> {
    if !looks_like_dsml(content) {
        return Vec::new();
    }

    let openers = find_invoke_openers(content);
    let mut calls = Vec::new();

    for (idx, (name_start, block_start)) in openers.iter().enumerate() {
        let block_end = openers
            .get(idx + 1)
            .map(|(name_start, _)| *name_start)
            .unwrap_or(content.len());
        let block = &content[*block_start..block_end];

        let Some(name) = extract_invoke_name(&content[*name_start..*block_start]) else {
            continue;
        };
        let params = extract_parameters(block);

        calls.push(ToolCall {
            call_id: format!("dsml_{idx}"),
            tool_name: name,
            arguments: serde_json::Value::Object(params.into_iter().collect()),
        });
    }

    calls
}

/// Find every `invoke name="..."` opener, returning `(tag_start, body_start)`
/// byte offsets: `tag_start` is where the opener text begins (used to bound
/// the previous block), `body_start` is just after the opener's `>`.
fn find_invoke_openers(content: &str) -> Vec<(usize, usize)> {
    let lower = content.to_ascii_lowercase();
    let mut out = Vec::new();
    let mut search_from = 0;

    while let Some(rel) = lower[search_from..].find("invoke") {
        let abs = search_from + rel;
        // Require this "invoke" to be immediately preceded by a DSML
        // delimiter (| or ｜) so we don't match the literal word "invoke"
        // appearing in ordinary prose.
        let preceding = lower[..abs].trim_end();
        if !preceding.ends_with('|') && !preceding.ends_with('\u{ff5c}') {
            search_from = abs + "invoke".len();
            continue;
        }
        // Skip a closer like `<|DSML|invoke>` with no `name=` — not an opener.
        let Some(gt) = lower[abs..].find('>') else {
            search_from = abs + "invoke".len();
            continue;
        };
        let tag_text = &lower[abs..abs + gt];
        if !tag_text.contains("name=") {
            search_from = abs + "invoke".len();
            continue;
        }
        out.push((abs, abs + gt + 1));
        search_from = abs + gt + 1;
    }

    out
}

fn extract_invoke_name(tag_fragment: &str) -> Option<String> {
    let lower = tag_fragment.to_ascii_lowercase();
    let name_pos = lower.find("name=")?;
    let after = &tag_fragment[name_pos + "name=".len()..];
    extract_quoted(after)
}

fn extract_parameters(block: &str) -> Vec<(String, serde_json::Value)> {
    let lower = block.to_ascii_lowercase();
    let mut params = Vec::new();
    let mut search_from = 0;

    while let Some(rel) = lower[search_from..].find("parameter") {
        let abs = search_from + rel;
        let preceding = lower[..abs].trim_end();
        if !preceding.ends_with('|') && !preceding.ends_with('\u{ff5c}') {
            search_from = abs + "parameter".len();
            continue;
        }
        let Some(gt) = lower[abs..].find('>') else {
            break;
        };
        let tag_end = abs + gt + 1;
        let Some(name) = extract_invoke_name(&block[abs..tag_end]) else {
            search_from = tag_end;
            continue;
        };

        let close_marker_pos = find_parameter_closer(&lower[tag_end..]);
        let value_end = tag_end + close_marker_pos.unwrap_or(block.len() - tag_end);
        let value = block[tag_end..value_end].trim().to_string();
        params.push((name, serde_json::Value::String(value)));

        search_from = value_end;
    }

    params
}

fn find_parameter_closer(rest_lower: &str) -> Option<usize> {
    // Matches `</|DSML|parameter>` (or the fullwidth delimiter variant).
    for marker in ["</|dsml|parameter>", "</\u{ff5c}dsml\u{ff5c}parameter>"] {
        if let Some(pos) = rest_lower.find(marker) {
            return Some(pos);
        }
    }
    None
}

fn extract_quoted(s: &str) -> Option<String> {
    let s = s.trim_start();
    let quote = s.chars().next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let rest = &s[quote.len_utf8()..];
    let end = rest.find(quote)?;
    Some(rest[..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_dsml_returns_empty() {
        assert!(parse_dsml_tool_calls("just a normal response").is_empty());
    }

    #[test]
    fn parses_single_invoke_with_parameters() {
        let content = concat!(
            "<|DSML|invoke name=\"read_file\">\n",
            "<|DSML|parameter name=\"path\">notes.md</|DSML|parameter>\n",
            "<|DSML|invoke>"
        );
        let calls = parse_dsml_tool_calls(content);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool_name, "read_file");
        assert_eq!(calls[0].call_id, "dsml_0");
        assert_eq!(calls[0].arguments["path"], "notes.md");
    }

    #[test]
    fn parses_multiple_invokes_in_sequence() {
        let content = concat!(
            "<|DSML|invoke name=\"read_file\">\n",
            "<|DSML|parameter name=\"path\">a.md</|DSML|parameter>\n",
            "<|DSML|invoke name=\"read_file\">\n",
            "<|DSML|parameter name=\"path\">b.md</|DSML|parameter>\n",
        );
        let calls = parse_dsml_tool_calls(content);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].arguments["path"], "a.md");
        assert_eq!(calls[1].arguments["path"], "b.md");
        assert_eq!(calls[0].call_id, "dsml_0");
        assert_eq!(calls[1].call_id, "dsml_1");
    }

    #[test]
    fn accepts_fullwidth_delimiter() {
        let content = concat!(
            "<\u{ff5c}DSML\u{ff5c}invoke name=\"exec\">\n",
            "<\u{ff5c}DSML\u{ff5c}parameter name=\"command\">ls</\u{ff5c}DSML\u{ff5c}parameter>\n",
        );
        let calls = parse_dsml_tool_calls(content);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool_name, "exec");
        assert_eq!(calls[0].arguments["command"], "ls");
    }

    #[test]
    fn case_insensitive_matching() {
        let content = concat!(
            "<|dsml|INVOKE NAME=\"exec\">\n",
            "<|dsml|PARAMETER NAME=\"command\">ls</|dsml|PARAMETER>\n",
        );
        let calls = parse_dsml_tool_calls(content);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool_name, "exec");
    }

    #[test]
    fn parsing_is_idempotent_on_the_same_content() {
        let content = concat!(
            "<|DSML|invoke name=\"read_file\">\n",
            "<|DSML|parameter name=\"path\">notes.md</|DSML|parameter>\n",
        );
        let once = parse_dsml_tool_calls(content);
        let twice = parse_dsml_tool_calls(content);
        assert_eq!(once.len(), twice.len());
        assert_eq!(once[0].tool_name, twice[0].tool_name);
        assert_eq!(once[0].arguments, twice[0].arguments);
    }

    #[test]
    fn does_not_panic_on_unicode_chars_that_change_length_when_lowercased() {
        // 'İ' (U+0130, LATIN CAPITAL LETTER I WITH DOT ABOVE) is 2 bytes in
        // UTF-8 but lowercases (via `str::to_lowercase`) to a 3-byte
        // sequence. Planting one before and inside the block would desync
        // byte offsets taken from a fully-lowercased copy; this must not
        // slice `content` off a char boundary.
        let content = concat!(
            "İ some prose\n",
            "<|DSML|invoke name=\"read_file\">\n",
            "<|DSML|parameter name=\"pİath\">notİes.md</|DSML|parameter>\n",
        );
        let calls = parse_dsml_tool_calls(content);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool_name, "read_file");
    }
}
