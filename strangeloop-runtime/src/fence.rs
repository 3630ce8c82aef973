//! Markdown code fence handling for model replies.

/// Return the body of the first fenced block, or the trimmed text if unfenced.
///
/// The info string after the opening fence (`json`, `rhai`, ...) is dropped.
/// An unterminated fence yields everything after the opening line.
pub fn strip_code_fences(content: &str) -> &str {
    let Some(start) = content.find("```") else {
        return content.trim();
    };
    let after_open = &content[start + 3..];
    let body = match after_open.find('\n') {
        Some(nl) => &after_open[nl + 1..],
        None => after_open,
    };
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unfenced() {
        assert_eq!(strip_code_fences("  {\"a\": 1}\n"), "{\"a\": 1}");
    }

    #[test]
    fn test_fenced_with_language() {
        let reply = "Here you go:\n```json\n{\"action\": \"direct_response\"}\n```\nThanks";
        assert_eq!(strip_code_fences(reply), "{\"action\": \"direct_response\"}");
    }

    #[test]
    fn test_fenced_without_language() {
        let reply = "```\nfn f() { 1 }\n```";
        assert_eq!(strip_code_fences(reply), "fn f() { 1 }");
    }

    #[test]
    fn test_first_block_only() {
        let reply = "```rhai\nfn a() { 1 }\n```\n\n```rhai\nfn b() { 2 }\n```";
        assert_eq!(strip_code_fences(reply), "fn a() { 1 }");
    }

    #[test]
    fn test_unterminated() {
        assert_eq!(strip_code_fences("```rhai\nfn a() { 1 }\n"), "fn a() { 1 }");
    }
}
