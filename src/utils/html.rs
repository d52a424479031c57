// src/utils/html.rs

use crate::error::AppError;

/// Strips unsafe markup from author-supplied text (exam titles, prompts,
/// option labels, display names) before it is stored.
///
/// Whitelist-based: harmless inline tags survive, `<script>` and event
/// handler attributes do not. The frontend renders these strings, so this
/// is the stored-XSS barrier between teachers and students.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input).trim().to_string()
}

/// Sanitises a mandatory field and enforces its limit on the stored form.
///
/// Entity escaping can grow the text (`&` becomes `&amp;`), so the length
/// validated on the request is not the length that reaches the database.
pub fn clean_required(input: &str, field: &str, max_chars: usize) -> Result<String, AppError> {
    let cleaned = clean_html(input);
    if cleaned.is_empty() {
        return Err(AppError::BadRequest(format!("{} is required", field)));
    }
    check_length(cleaned, field, max_chars)
}

/// Like [`clean_required`] for nullable fields. Empty after sanitising is stored as NULL.
pub fn clean_optional(
    input: Option<String>,
    field: &str,
    max_chars: usize,
) -> Result<Option<String>, AppError> {
    match input.map(|s| clean_html(&s)) {
        Some(cleaned) if !cleaned.is_empty() => check_length(cleaned, field, max_chars).map(Some),
        _ => Ok(None),
    }
}

fn check_length(cleaned: String, field: &str, max_chars: usize) -> Result<String, AppError> {
    if cleaned.chars().count() > max_chars {
        return Err(AppError::BadRequest(format!(
            "{} must be at most {} characters",
            field, max_chars
        )));
    }
    Ok(cleaned)
}
