// src/utils/html.rs

/// Sanitize admin-authored rich text (question statements, explanations).
///
/// Whitelist-based: safe formatting tags survive, scripts and event handler
/// attributes are stripped. Acts as the last line of defense against stored
/// XSS in content shown back to students.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}
