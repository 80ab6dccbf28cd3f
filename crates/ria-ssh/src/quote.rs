use std::path::Path;

/// Quote `s` for a POSIX shell command line.
///
/// Strings made of safe characters are left alone; anything else is
/// wrapped in single quotes, with embedded single quotes spliced in as
/// `'"'"'`.
pub fn sh_quote(s: &str) -> String {
    if s.is_empty() {
        return "''".to_string();
    }
    if s.chars().all(is_safe) {
        return s.to_string();
    }
    format!("'{}'", s.replace('\'', r#"'"'"'"#))
}

/// Quote a path for a POSIX shell command line.
pub fn quote_path(path: &Path) -> String {
    sh_quote(&path.to_string_lossy())
}

fn is_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '@' | '%' | '+' | '=' | ':' | ',' | '.' | '/' | '-' | '_')
}
