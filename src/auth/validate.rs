use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ApiError;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Username: 3-80 characters, letters, digits and underscores only.
pub(crate) fn validate_username(username: &str) -> Result<(), ApiError> {
    lazy_static! {
        static ref USERNAME_RE: Regex = Regex::new(r"^[A-Za-z0-9_]+$").unwrap();
    }
    if username.len() < 3 || username.len() > 80 {
        return Err(ApiError::validation(
            "Username must be between 3 and 80 characters",
        ));
    }
    if !USERNAME_RE.is_match(username) {
        return Err(ApiError::validation(
            "Username can only contain letters, numbers, and underscores",
        ));
    }
    Ok(())
}

/// Password strength: at least 8 characters with an uppercase letter, a
/// lowercase letter and a digit.
pub(crate) fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() < 8 {
        return Err(ApiError::validation(
            "Password must be at least 8 characters long",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(ApiError::validation(
            "Password must contain at least one uppercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(ApiError::validation(
            "Password must contain at least one lowercase letter",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(ApiError::validation(
            "Password must contain at least one digit",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_addresses() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("first.last+tag@sub.domain.org"));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("missing@tld"));
        assert!(!is_valid_email("spaces in@example.com"));
        assert!(!is_valid_email("@example.com"));
    }

    #[test]
    fn username_length_bounds() {
        assert!(validate_username("ab").is_err());
        assert!(validate_username("abc").is_ok());
        assert!(validate_username(&"a".repeat(80)).is_ok());
        assert!(validate_username(&"a".repeat(81)).is_err());
    }

    #[test]
    fn username_charset() {
        assert!(validate_username("good_name_42").is_ok());
        assert!(validate_username("bad-name").is_err());
        assert!(validate_username("bad name").is_err());
        assert!(validate_username("bad@name").is_err());
    }

    #[test]
    fn password_rules_each_enforced() {
        assert!(validate_password("Valid1pw").is_ok());
        // too short
        assert!(validate_password("Sh0rt").is_err());
        // missing uppercase
        assert!(validate_password("alllower1").is_err());
        // missing lowercase
        assert!(validate_password("ALLUPPER1").is_err());
        // missing digit
        assert!(validate_password("NoDigitsHere").is_err());
    }
}
