/// Mask everything past the first `visible` characters of a credential so it
/// can be logged.
pub fn mask_token(token: &str, visible: usize) -> String {
    let total = token.chars().count();
    if total <= visible {
        return token.to_string();
    }
    let head: String = token.chars().take(visible).collect();
    format!("{head}{}", "x".repeat(total - visible))
}

/// Render a vanity code for log output, with `None` standing in for no code.
pub fn display_code(code: &str) -> &str {
    if code.is_empty() {
        "None"
    } else {
        code
    }
}
