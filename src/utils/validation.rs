use std::borrow::Cow;
use validator::ValidationError;

/// Longest file or folder name accepted, in bytes.
pub const MAX_NAME_LEN: usize = 255;

fn error(code: &'static str, message: &'static str) -> ValidationError {
    ValidationError::new(code).with_message(Cow::Borrowed(message))
}

/// Password must be 8-128 characters and contain an uppercase letter,
/// a lowercase letter and a digit.
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    let len = password.chars().count();
    if !(8..=128).contains(&len) {
        return Err(error(
            "password_length",
            "Password must be between 8 and 128 characters",
        ));
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        return Err(error(
            "password_uppercase",
            "Password must contain an uppercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        return Err(error(
            "password_lowercase",
            "Password must contain a lowercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(error("password_digit", "Password must contain a digit"));
    }
    Ok(())
}

/// Usernames are 3-32 ASCII letters, digits, `_` or `-`.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if !(3..=32).contains(&username.len()) {
        return Err(error(
            "username_length",
            "Username must be between 3 and 32 characters",
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(error(
            "username_charset",
            "Username may only contain letters, digits, '_' and '-'",
        ));
    }
    Ok(())
}

/// Trims a file or folder name and rejects anything that could escape its
/// folder or confuse clients.
pub fn sanitize_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(error("name_empty", "Name must not be empty"));
    }
    if trimmed == "." || trimmed == ".." {
        return Err(error("name_reserved", "Name is reserved"));
    }
    if trimmed.len() > MAX_NAME_LEN {
        return Err(error("name_length", "Name must be at most 255 bytes"));
    }
    if trimmed.contains(['/', '\\']) {
        return Err(error(
            "name_separator",
            "Name must not contain path separators",
        ));
    }
    if trimmed.chars().any(|c| c.is_control()) {
        return Err(error(
            "name_control_chars",
            "Name must not contain control characters",
        ));
    }

    Ok(trimmed.to_string())
}

/// Validator-compatible wrapper around [`sanitize_name`].
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    sanitize_name(name).map(|_| ())
}

/// Content type must parse as a MIME type; parameters are dropped.
pub fn normalize_mime_type(content_type: &str) -> Result<String, ValidationError> {
    let parsed: mime::Mime = content_type
        .trim()
        .parse()
        .map_err(|_| error("mime_type", "Invalid MIME type"))?;
    Ok(parsed.essence_str().to_lowercase())
}

/// Produces `name (n)` keeping the extension of files in place.
pub fn numbered_name(name: &str, n: u32, is_file: bool) -> String {
    if is_file {
        if let Some((stem, ext)) = name.rsplit_once('.') {
            if !stem.is_empty() {
                return format!("{} ({}).{}", stem, n, ext);
            }
        }
    }
    format!("{} ({})", name, n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_rules() {
        assert!(validate_password("Passw0rd").is_ok());
        assert!(validate_password("Sh0rt").is_err());
        assert!(validate_password("alllowercase1").is_err());
        assert!(validate_password("ALLUPPERCASE1").is_err());
        assert!(validate_password("NoDigitsHere").is_err());
        assert!(validate_password(&format!("Aa1{}", "x".repeat(200))).is_err());
    }

    #[test]
    fn test_password_rule_codes() {
        let err = validate_password("nouppercase1").unwrap_err();
        assert_eq!(err.code, "password_uppercase");
    }

    #[test]
    fn test_username_rules() {
        assert!(validate_username("alice_01").is_ok());
        assert!(validate_username("al").is_err());
        assert!(validate_username("alice smith").is_err());
        assert!(validate_username("ålice").is_err());
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("  report.pdf ").unwrap(), "report.pdf");
        assert!(sanitize_name("").is_err());
        assert!(sanitize_name("   ").is_err());
        assert!(sanitize_name("..").is_err());
        assert!(sanitize_name("../etc/passwd").is_err());
        assert!(sanitize_name("a\\b").is_err());
        assert!(sanitize_name("bad\u{0}name").is_err());
        assert!(sanitize_name(&"a".repeat(256)).is_err());
        assert!(sanitize_name(&"a".repeat(255)).is_ok());
    }

    #[test]
    fn test_normalize_mime_type() {
        assert_eq!(
            normalize_mime_type("Text/Plain; charset=utf-8").unwrap(),
            "text/plain"
        );
        assert!(normalize_mime_type("not a mime").is_err());
    }

    #[test]
    fn test_numbered_name() {
        assert_eq!(numbered_name("report.pdf", 1, true), "report (1).pdf");
        assert_eq!(numbered_name("archive.tar.gz", 2, true), "archive.tar (2).gz");
        assert_eq!(numbered_name(".env", 1, true), ".env (1)");
        assert_eq!(numbered_name("Photos", 3, false), "Photos (3)");
    }
}
