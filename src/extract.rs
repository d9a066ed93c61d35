// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Revu Contributors

//! Robust JSON extraction from model output
//!
//! Completion text carries no structured-output guarantee: the decision we
//! asked for may arrive as bare JSON, inside a fenced code block, or buried
//! in prose with stray control characters. Extraction runs an ordered list
//! of parser strategies; the first success wins and exhaustion yields
//! `None`, never an error.

use serde_json::Value;

/// Extract the first JSON object found in model output.
///
/// Strategies, in order: whole-text parse, fenced code block parse,
/// brace-delimited substring parse, brace-delimited substring with
/// newline/tab/carriage-return characters stripped.
pub fn extract_json(text: &str) -> Option<Value> {
    const STRATEGIES: &[fn(&str) -> Option<Value>] = &[
        parse_whole,
        parse_fenced_block,
        parse_braced,
        parse_braced_stripped,
    ];

    STRATEGIES.iter().find_map(|strategy| strategy(text))
}

fn parse_object(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text) {
        Ok(value) if value.is_object() => Some(value),
        _ => None,
    }
}

fn parse_whole(text: &str) -> Option<Value> {
    parse_object(text.trim())
}

/// Parse the contents of the first ``` or ```json fence
fn parse_fenced_block(text: &str) -> Option<Value> {
    let mut rest = text;
    while let Some(start) = rest.find("```") {
        let after_fence = &rest[start + 3..];
        // Skip an optional language tag up to the end of the line.
        let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
        let body = &after_fence[body_start..];
        let Some(end) = body.find("```") else {
            return None;
        };
        if let Some(value) = parse_object(body[..end].trim()) {
            return Some(value);
        }
        rest = &body[end + 3..];
    }
    None
}

fn braced_substring(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}

fn parse_braced(text: &str) -> Option<Value> {
    parse_object(braced_substring(text)?)
}

fn parse_braced_stripped(text: &str) -> Option<Value> {
    let substring = braced_substring(text)?;
    let cleaned: String = substring
        .chars()
        .filter(|c| !matches!(c, '\n' | '\r' | '\t'))
        .collect();
    parse_object(&cleaned)
}
