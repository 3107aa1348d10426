//! Fallback completeness check for handlers that do not provide one.

use nbkernel_core::{Completeness, IsCompleteReply};

/// Classify `code` by bracket balance and line continuation.
///
/// Brackets inside single or double quotes are ignored. A closer with no
/// matching opener makes the code invalid; an unclosed opener, an unclosed
/// quote, or a trailing backslash makes it incomplete.
#[must_use]
pub fn check(code: &str) -> IsCompleteReply {
    let mut open = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in code.chars() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' | '[' | '{' => open.push(c),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if open.pop() != Some(expected) {
                    return IsCompleteReply::new(Completeness::Invalid);
                }
            }
            _ => {}
        }
    }

    if quote.is_some() || !open.is_empty() || code.trim_end().ends_with('\\') {
        return IsCompleteReply::new(Completeness::Incomplete);
    }
    IsCompleteReply::new(Completeness::Complete)
}
