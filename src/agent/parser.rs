//! Sentinel grammar for the reasoning loop (spec.md §4.5, §8).
//!
//! Two sentinels: `USE_TOOL[tool_name](key1=value1, key2=value2, ...)` for a
//! tool invocation, and `FINAL_ANSWER[<content>]` for termination. Organized
//! the way the teacher's `agents/parser.rs` is organized — domain structs,
//! a parse function, private helpers, tests at the bottom — even though the
//! grammar itself is unrelated to the teacher's ReAct `Action:`/`Action
//! Input:` format.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub name: String,
    pub params: Vec<(String, String)>,
}

impl ToolCall {
    pub fn params_map(&self) -> std::collections::HashMap<String, String> {
        self.params.iter().cloned().collect()
    }
}

/// Scans `text` for every `USE_TOOL[name](...)` occurrence. Commas inside
/// single- or double-quoted values do not split parameters; a malformed
/// sentinel (no matching `]` or `(...)`) is skipped rather than aborting the
/// whole scan.
pub fn parse_tool_calls(text: &str) -> Vec<ToolCall> {
    const MARKER: &str = "USE_TOOL[";
    let mut calls = Vec::new();
    let mut rest = text;

    while let Some(marker_at) = rest.find(MARKER) {
        let after_marker = &rest[marker_at + MARKER.len()..];
        let Some(bracket_end) = after_marker.find(']') else {
            break;
        };
        let name = after_marker[..bracket_end].trim().to_string();
        let after_name = &after_marker[bracket_end + 1..];
        let after_name_trimmed = after_name.trim_start();

        if !after_name_trimmed.starts_with('(') {
            rest = after_name;
            continue;
        }

        match find_matching_paren(after_name_trimmed) {
            Some((inner, consumed_chars)) => {
                calls.push(ToolCall { name, params: parse_params(&inner) });
                rest = advance_by_chars(after_name_trimmed, consumed_chars);
            }
            None => {
                rest = after_name_trimmed;
            }
        }
    }

    calls
}

/// Given a string starting with `(`, finds the body between the opening and
/// its matching closing `)`, honoring quoted substrings so a `)` or `,`
/// inside a quote never terminates/splits early. Returns the inner body and
/// the number of chars consumed (including both parens).
fn find_matching_paren(s: &str) -> Option<(String, usize)> {
    let chars: Vec<char> = s.chars().collect();
    let mut depth = 0i32;
    let mut in_quote: Option<char> = None;

    for (idx, &c) in chars.iter().enumerate() {
        match in_quote {
            Some(q) => {
                if c == q {
                    in_quote = None;
                }
            }
            None => match c {
                '\'' | '"' => in_quote = Some(c),
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        let inner: String = chars[1..idx].iter().collect();
                        return Some((inner, idx + 1));
                    }
                }
                _ => {}
            },
        }
    }
    None
}

fn advance_by_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((byte_idx, _)) => &s[byte_idx..],
        None => "",
    }
}

fn parse_params(body: &str) -> Vec<(String, String)> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quote: Option<char> = None;

    for c in body.chars() {
        match in_quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    in_quote = None;
                }
            }
            None => match c {
                '\'' | '"' => {
                    in_quote = Some(c);
                    current.push(c);
                }
                ',' => {
                    parts.push(std::mem::take(&mut current));
                }
                _ => current.push(c),
            },
        }
    }
    if !current.trim().is_empty() {
        parts.push(current);
    }

    parts
        .into_iter()
        .filter_map(|part| {
            let part = part.trim();
            let eq = part.find('=')?;
            let key = part[..eq].trim().to_string();
            let value = strip_quotes(part[eq + 1..].trim());
            Some((key, value))
        })
        .collect()
}

fn strip_quotes(s: &str) -> String {
    let bytes = s.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'\'' && last == b'\'') || (first == b'"' && last == b'"') {
            return s[1..s.len() - 1].to_string();
        }
    }
    s.to_string()
}

/// Extracts the content of a `FINAL_ANSWER[...]` sentinel, captured
/// non-greedily to the LAST `]` before end-of-text — so a `]` appearing
/// inside the content itself does not truncate it.
pub fn extract_final_answer(text: &str) -> Option<String> {
    const MARKER: &str = "FINAL_ANSWER[";
    let start = text.find(MARKER)?;
    let content_start = start + MARKER.len();
    let rest = &text[content_start..];
    let last_bracket = rest.rfind(']')?;
    Some(rest[..last_bracket].to_string())
}

/// Fallback termination signal per spec.md §9's tie-break: only consulted
/// when `FINAL_ANSWER[...]` is absent and no tool call succeeded this
/// iteration.
pub fn has_completion_keyword(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("task complete") || lower.contains("finished")
}

/// Best-effort answer extraction once the iteration/time budget is
/// exhausted without a `FINAL_ANSWER[...]`: the last `n` non-empty lines of
/// the agent's most recent reasoning text.
pub fn last_nonempty_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_comma_does_not_split_params() {
        let calls = parse_tool_calls(r#"USE_TOOL[search](k1="v, 1", k2=v2)"#);
        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert_eq!(call.name, "search");
        assert_eq!(call.params, vec![("k1".to_string(), "v, 1".to_string()), ("k2".to_string(), "v2".to_string())]);
    }

    #[test]
    fn single_quotes_are_also_stripped() {
        let calls = parse_tool_calls("USE_TOOL[search](q='hello world')");
        assert_eq!(calls[0].params, vec![("q".to_string(), "hello world".to_string())]);
    }

    #[test]
    fn multiple_calls_in_one_response() {
        let text = "USE_TOOL[a](x=1)\nsome text\nUSE_TOOL[b](y=2)";
        let calls = parse_tool_calls(text);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].name, "a");
        assert_eq!(calls[1].name, "b");
    }

    #[test]
    fn final_answer_anchors_to_last_bracket() {
        let text = "Thought: done\nFINAL_ANSWER[the result set is [1, 2, 3]]";
        let answer = extract_final_answer(text).unwrap();
        assert_eq!(answer, "the result set is [1, 2, 3]");
    }

    #[test]
    fn final_answer_simple_case() {
        let text = "FINAL_ANSWER[42]";
        assert_eq!(extract_final_answer(text).unwrap(), "42");
    }

    #[test]
    fn no_final_answer_returns_none() {
        assert!(extract_final_answer("just some thoughts").is_none());
    }

    #[test]
    fn completion_keyword_is_case_insensitive() {
        assert!(has_completion_keyword("Task Complete, all done"));
        assert!(has_completion_keyword("I have FINISHED the work"));
        assert!(!has_completion_keyword("still thinking"));
    }

    #[test]
    fn malformed_sentinel_is_skipped_not_fatal() {
        let calls = parse_tool_calls("USE_TOOL[broken no closing paren");
        assert!(calls.is_empty());
    }
}
