//! Bounded prompt construction

use crate::context::FailureContext;

pub const MAX_ERROR_CHARS: usize = 1_000;
pub const MAX_STACK_CHARS: usize = 1_500;
pub const MAX_PROMPT_CHARS: usize = 3_500;

pub const NO_STACK_MARKER: &str = "No stack trace captured.";
pub const ELLIPSIS: &str = "...";

pub const SYSTEM_PROMPT: &str = "You are a senior QA automation engineer. \
Give concise, practical Playwright debugging guidance. \
Be specific about locators, waits, assertions and test data. \
Keep the answer short and use plain text.";

/// Keep at most `max` characters of `text`, appending an ellipsis when
/// anything was cut.
pub fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}{}", &text[..cut], ELLIPSIS),
        None => text.to_string(),
    }
}

/// Hard cut at `max` characters with no marker.
fn clamp(text: String, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text,
    }
}

/// Build the user prompt for a failed test.
///
/// The result never exceeds [`MAX_PROMPT_CHARS`] characters.
pub fn build_prompt(context: &FailureContext) -> String {
    let error = truncate(&context.error_message, MAX_ERROR_CHARS);
    let stack = context
        .stack
        .as_deref()
        .map(|s| truncate(s, MAX_STACK_CHARS))
        .unwrap_or_else(|| NO_STACK_MARKER.to_string());

    let prompt = format!(
        "A Playwright end-to-end test failed. Explain the failure to the engineer on call.\n\
         \n\
         Suite: {suite}\n\
         Test: {title}\n\
         File: {file}\n\
         \n\
         Error:\n\
         {error}\n\
         \n\
         Stack:\n\
         {stack}\n\
         \n\
         Answer with exactly three labeled sections and nothing else:\n\
         Likely cause: <one or two sentences>\n\
         What to check first: <one or two sentences>\n\
         Suggested fix: <one or two sentences>",
        suite = context.suite,
        title = context.test_title,
        file = context.file,
        error = error,
        stack = stack,
    );

    clamp(prompt, MAX_PROMPT_CHARS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(error: &str, stack: Option<&str>) -> FailureContext {
        FailureContext::new(
            "Login flow",
            "shows error for invalid password",
            "login.spec",
            Some(error.to_string()),
            stack.map(String::from),
        )
    }

    /// Text between `start` and the next blank line.
    fn section<'a>(prompt: &'a str, start: &str) -> &'a str {
        let begin = prompt.find(start).unwrap() + start.len();
        let rest = &prompt[begin..];
        let end = rest.find("\n\n").unwrap_or(rest.len());
        &rest[..end]
    }

    #[test]
    fn test_truncate_short_text_untouched() {
        assert_eq!(truncate("abc", 3), "abc");
        assert_eq!(truncate("", 10), "");
    }

    #[test]
    fn test_truncate_appends_ellipsis() {
        assert_eq!(truncate("abcdef", 3), "abc...");
    }

    #[test]
    fn test_truncate_counts_chars_not_bytes() {
        let text = "é".repeat(5);
        assert_eq!(truncate(&text, 2), "éé...");
    }

    #[test]
    fn test_long_error_is_bounded() {
        let prompt = build_prompt(&context(&"x".repeat(5_000), None));
        let error = section(&prompt, "Error:\n");
        assert!(error.ends_with(ELLIPSIS));
        assert_eq!(error.trim_end_matches(ELLIPSIS).chars().count(), MAX_ERROR_CHARS);
    }

    #[test]
    fn test_long_stack_is_bounded() {
        let prompt = build_prompt(&context("boom", Some(&"s".repeat(4_000))));
        let stack = section(&prompt, "Stack:\n");
        assert!(stack.ends_with(ELLIPSIS));
        assert_eq!(stack.trim_end_matches(ELLIPSIS).chars().count(), MAX_STACK_CHARS);
    }

    #[test]
    fn test_missing_stack_uses_marker() {
        let prompt = build_prompt(&context("boom", None));
        assert_eq!(section(&prompt, "Stack:\n"), NO_STACK_MARKER);
    }

    #[test]
    fn test_prompt_names_context_and_sections() {
        let prompt = build_prompt(&context("Timeout 15000ms exceeded", Some("at login.js:4")));
        assert!(prompt.contains("Suite: Login flow"));
        assert!(prompt.contains("Test: shows error for invalid password"));
        assert!(prompt.contains("File: login.spec"));
        assert!(prompt.contains("Timeout 15000ms exceeded"));
        assert!(prompt.contains("Likely cause:"));
        assert!(prompt.contains("What to check first:"));
        assert!(prompt.contains("Suggested fix:"));
    }

    #[test]
    fn test_prompt_never_exceeds_cap() {
        let huge = "t".repeat(10_000);
        let ctx = FailureContext::new(
            huge.clone(),
            huge.clone(),
            huge.clone(),
            Some(huge.clone()),
            Some(huge),
        );
        assert_eq!(build_prompt(&ctx).chars().count(), MAX_PROMPT_CHARS);

        let small = build_prompt(&context("boom", None));
        assert!(small.chars().count() < MAX_PROMPT_CHARS);
    }
}
