use std::sync::LazyLock;

use luna_common::{Error, Result};
use regex::Regex;

const MAX_NAME_LEN: usize = 80;
const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 256;
const MAX_EMAIL_LEN: usize = 254;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

static TOOL_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("tool name pattern is valid"));

/// Input validation and sanitization for request payloads.
pub struct InputValidator;

impl InputValidator {
    /// Sanitize user input by removing control characters.
    pub fn sanitize(input: &str) -> String {
        input
            .chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
            .collect()
    }

    /// Normalize and validate an email address (trimmed, lowercased).
    pub fn email(input: &str) -> Result<String> {
        let email = input.trim().to_lowercase();
        if email.len() > MAX_EMAIL_LEN || !EMAIL_RE.is_match(&email) {
            return Err(Error::Validation("a valid email address is required".into()));
        }
        Ok(email)
    }

    pub fn password(input: &str) -> Result<()> {
        let len = input.chars().count();
        if len < MIN_PASSWORD_LEN {
            return Err(Error::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        if len > MAX_PASSWORD_LEN {
            return Err(Error::Validation("password is too long".into()));
        }
        Ok(())
    }

    /// Validate a display name for users, companions, teams or workspaces.
    pub fn name(field: &str, input: &str) -> Result<String> {
        let name = Self::sanitize(input).trim().to_string();
        if name.is_empty() {
            return Err(Error::Validation(format!("{field} cannot be empty")));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(Error::Validation(format!(
                "{field} must be at most {MAX_NAME_LEN} characters"
            )));
        }
        Ok(name)
    }

    /// Validate free text (chat messages, memory content) against a length cap.
    pub fn text(field: &str, input: &str, max_chars: usize) -> Result<String> {
        let text = Self::sanitize(input).trim().to_string();
        if text.is_empty() {
            return Err(Error::Validation(format!("{field} cannot be empty")));
        }
        if text.chars().count() > max_chars {
            return Err(Error::Validation(format!(
                "{field} must be at most {max_chars} characters"
            )));
        }
        Ok(text)
    }

    /// Function names follow the OpenAI function-calling naming rule.
    pub fn tool_name(input: &str) -> Result<()> {
        if !TOOL_NAME_RE.is_match(input) {
            return Err(Error::Validation(
                "tool name must be 1-64 characters of letters, digits, '_' or '-'".into(),
            ));
        }
        Ok(())
    }

    pub fn handler_url(input: &str) -> Result<()> {
        let url = url::Url::parse(input)
            .map_err(|e| Error::Validation(format!("invalid handler URL: {e}")))?;
        match url.scheme() {
            "http" | "https" if url.host_str().is_some() => Ok(()),
            _ => Err(Error::Validation(
                "handler URL must be an http(s) URL with a host".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::InputValidator;

    #[test]
    fn sanitize_strips_control_characters() {
        assert_eq!(InputValidator::sanitize("hi\u{0007}\tthere\n"), "hi\tthere\n");
    }

    #[test]
    fn email_is_normalized() {
        assert_eq!(
            InputValidator::email("  Alice@Example.COM ").unwrap(),
            "alice@example.com"
        );
        assert!(InputValidator::email("not-an-email").is_err());
        assert!(InputValidator::email("a@b").is_err());
    }

    #[test]
    fn password_length_bounds() {
        assert!(InputValidator::password("short").is_err());
        assert!(InputValidator::password("long-enough").is_ok());
    }

    #[test]
    fn names_are_trimmed_and_bounded() {
        assert_eq!(InputValidator::name("name", "  Luna ").unwrap(), "Luna");
        assert!(InputValidator::name("name", "   ").is_err());
        assert!(InputValidator::name("name", &"x".repeat(81)).is_err());
    }

    #[test]
    fn tool_names_and_urls() {
        assert!(InputValidator::tool_name("get_weather").is_ok());
        assert!(InputValidator::tool_name("get weather").is_err());
        assert!(InputValidator::tool_name("").is_err());
        assert!(InputValidator::handler_url("https://tools.example.com/weather").is_ok());
        assert!(InputValidator::handler_url("ftp://tools.example.com").is_err());
        assert!(InputValidator::handler_url("not a url").is_err());
    }
}
