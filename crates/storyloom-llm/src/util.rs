//! Shared helpers for service clients

/// Longest error message kept verbatim
const MAX_ERROR_LEN: usize = 300;

/// Mask API key for safe display in logs
///
/// Shows the first and last four characters of keys longer than eight
/// characters, `****` otherwise.
///
/// ```
/// use storyloom_llm::util::mask_api_key;
/// assert_eq!(mask_api_key("sk-1234567890abcdef"), "sk-1...cdef");
/// assert_eq!(mask_api_key("short"), "****");
/// ```
#[must_use]
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

/// Cut `s` to at most `max_chars` characters without splitting a character
#[must_use]
pub fn truncate_safe(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Strip credentials and local paths from a service error before it is
/// logged or stored.
#[must_use]
pub fn sanitize_api_error(error: &str) -> String {
    let lower = error.to_lowercase();

    if lower.contains("api key")
        || lower.contains("api_key")
        || lower.contains("apikey")
        || lower.contains("unauthorized")
        || lower.contains("authentication")
        || lower.contains("bearer")
    {
        return "API authentication error. Please check your API key configuration.".to_string();
    }

    if lower.contains("rate limit") || lower.contains("quota") {
        return "API rate limit exceeded. Please try again later.".to_string();
    }

    if lower.contains("/home") || lower.contains("/root") || lower.contains("\\users\\") {
        return "An internal error occurred in the service.".to_string();
    }

    if error.chars().count() > MAX_ERROR_LEN {
        format!("{}...(truncated)", truncate_safe(error, MAX_ERROR_LEN))
    } else {
        error.to_string()
    }
}
