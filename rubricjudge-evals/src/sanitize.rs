// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Best-effort cleanup of almost-JSON model output
//!
//! Applied once to every output that fails a strict parse, before any repair
//! prompt is spent on it:
//!
//! 1. Normalize smart quotes
//! 2. Strip markdown code fences and any prose around the JSON value
//! 3. Turn bare backtick quotes (outside strings) into double quotes
//! 4. Escape raw control characters inside string literals
//! 5. Close an unterminated string and append missing `}` / `]`

use regex::Regex;
use std::sync::OnceLock;

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)(?:```|$)").expect("valid regex")
    })
}

/// Run every cleanup step in order
pub fn sanitize(raw: &str) -> String {
    let text = normalize_quotes(raw);
    let text = strip_code_fences(&text);
    let text = extract_json_region(&text);
    let text = normalize_backticks(&text);
    let text = escape_control_characters(&text);
    balance_brackets(&text)
}

/// Replace typographic quotes used as JSON delimiters with ASCII ones
///
/// Only quotes outside string literals are structural. Inside a string
/// opened by `"` they are content and stay untouched; a string opened by a
/// typographic quote is closed by the next typographic double quote.
pub fn normalize_quotes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    // Some(true) when the open string started with a typographic quote
    let mut open: Option<bool> = None;
    let mut escaped = false;
    for c in text.chars() {
        match open {
            Some(typographic) => {
                if escaped {
                    escaped = false;
                    out.push(c);
                    continue;
                }
                match c {
                    '\\' => {
                        escaped = true;
                        out.push(c);
                    }
                    '"' => {
                        open = None;
                        out.push(c);
                    }
                    c if typographic && is_double_quote(c) => {
                        open = None;
                        out.push('"');
                    }
                    c => out.push(c),
                }
            }
            None => match c {
                '"' => {
                    open = Some(false);
                    out.push(c);
                }
                c if is_double_quote(c) => {
                    open = Some(true);
                    out.push('"');
                }
                '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' => out.push('\''),
                c => out.push(c),
            },
        }
    }
    out
}

fn is_double_quote(c: char) -> bool {
    matches!(
        c,
        '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}'
    )
}

/// Body of the first markdown code fence, or the input when there is none.
/// An unterminated fence (truncated output) yields everything after it.
pub fn strip_code_fences(text: &str) -> String {
    match fence_regex().captures(text).and_then(|c| c.get(1)) {
        Some(body) => body.as_str().trim().to_string(),
        None => text.trim().to_string(),
    }
}

/// Slice from the first `{` or `[` to the end of the matching value,
/// dropping prose on either side. Unbalanced input keeps its tail.
pub fn extract_json_region(text: &str) -> String {
    let start = match text.find(['{', '[']) {
        Some(start) => start,
        None => return text.to_string(),
    };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return text[start..start + offset + c.len_utf8()].to_string();
                }
            }
            _ => {}
        }
    }
    text[start..].to_string()
}

/// Backticks used as string delimiters outside of JSON strings become `"`
pub fn normalize_backticks(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    for c in text.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            out.push(c);
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '`' => out.push('"'),
            _ => out.push(c),
        }
    }
    out
}

/// Escape raw newlines, tabs and other control characters inside strings
pub fn escape_control_characters(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    for c in text.chars() {
        if !in_string {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
            continue;
        }
        if escaped {
            escaped = false;
            out.push(c);
            continue;
        }
        match c {
            '\\' => {
                escaped = true;
                out.push(c);
            }
            '"' => {
                in_string = false;
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// Append the minimal closing tokens for a truncated value
///
/// Closes an open string, drops a dangling comma, completes a dangling key
/// with `null`, then closes open objects and arrays innermost first.
pub fn balance_brackets(text: &str) -> String {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for c in text.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() == Some(&c) {
                    stack.pop();
                }
            }
            _ => {}
        }
    }

    if stack.is_empty() && !in_string {
        return text.to_string();
    }

    let mut out = text.to_string();
    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }

    let trimmed_len = out.trim_end().len();
    out.truncate(trimmed_len);
    if out.ends_with(',') {
        out.pop();
    }
    if out.ends_with(':') {
        out.push_str(" null");
    }

    while let Some(closer) = stack.pop() {
        out.push(closer);
    }
    out
}
