//! Stack trace normalization
//!
//! Turns a multi-line stack into one bounded line: frames joined with `@`,
//! at most [`MAX_FRAMES`] segments, query strings stripped from frame
//! locations so cache-busting parameters and tokens never leave the page.

use regex::Regex;
use std::sync::OnceLock;

use crate::types::ScriptError;

/// Maximum number of segments kept from a stack
pub const MAX_FRAMES: usize = 9;

/// Separator between segments of a formatted stack
pub const FRAME_DELIMITER: &str = "@";

fn frame_separator() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bat\b").expect("valid frame separator regex"))
}

fn query_string() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\?[^:]+").expect("valid query string regex"))
}

/// Format an error as a single line.
///
/// Errors without a stack render as `Name: message`. Otherwise the stack is
/// flattened and trimmed, and prefixed with the message whenever the stack
/// does not already contain it.
pub fn format_stack(error: &ScriptError) -> String {
    let message = error.to_string();
    let Some(stack) = error.stack.as_deref().filter(|s| !s.is_empty()) else {
        return message;
    };

    let flattened: String = stack.chars().filter(|c| *c != '\n' && *c != '\r').collect();
    let frames: Vec<&str> = frame_separator()
        .split(&flattened)
        .take(MAX_FRAMES)
        .collect();
    let joined = frames.join(FRAME_DELIMITER);
    let formatted = query_string().replace_all(&joined, "").into_owned();

    if formatted.contains(&message) {
        formatted
    } else {
        format!("{}{}{}", message, FRAME_DELIMITER, formatted)
    }
}
