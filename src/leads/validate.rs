//! Submission validation and free-text sanitization.
//!
//! Fields are checked in order (name, phone, service, message); the first
//! violation is reported.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use super::model::{ClientMeta, LeadSubmission, NewLead};
use crate::error::SubmitError;

pub const NAME_MIN: usize = 2;
pub const NAME_MAX: usize = 150;
pub const PHONE_MIN: usize = 6;
pub const PHONE_MAX: usize = 30;
pub const SERVICE_MIN: usize = 2;
pub const SERVICE_MAX: usize = 200;
pub const MESSAGE_MAX: usize = 2000;

/// Conservative phone pattern: leading `+` or digit, digits and common
/// punctuation, trailing digit.
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+0-9][0-9\-\s().]{5,28}[0-9]$").expect("phone pattern is valid")
});

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Validate a raw submission and build a sanitized `NewLead`.
pub fn validate_submission(
    submission: &LeadSubmission,
    client: &ClientMeta,
    received_at: DateTime<Utc>,
) -> Result<NewLead, SubmitError> {
    let name = required_text("name", submission.name.as_deref(), NAME_MIN, NAME_MAX)?;

    let phone = required_text("phone", submission.phone.as_deref(), PHONE_MIN, PHONE_MAX)?;
    if !PHONE_RE.is_match(phone) {
        return Err(SubmitError::InvalidInput("Invalid phone number format.".into()));
    }

    let service = required_text("service", submission.service.as_deref(), SERVICE_MIN, SERVICE_MAX)?;

    let message = submission.message.as_deref().map(str::trim).unwrap_or("");
    if message.chars().count() > MESSAGE_MAX {
        return Err(too_long("message", MESSAGE_MAX));
    }

    Ok(NewLead {
        name: sanitize(name, NAME_MAX),
        phone: sanitize(phone, PHONE_MAX),
        service: sanitize(service, SERVICE_MAX),
        message: sanitize(message, MESSAGE_MAX),
        ip: client.ip.clone(),
        user_agent: client.user_agent.clone(),
        referrer: client.referrer.clone(),
        received_at,
    })
}

/// Collapse whitespace runs to a single space, trim, and cap at `max` characters.
pub fn sanitize(value: &str, max: usize) -> String {
    let collapsed = WHITESPACE_RE.replace_all(value, " ");
    crate::error::truncate_chars(collapsed.trim(), max)
}

fn required_text<'a>(
    field: &str,
    value: Option<&'a str>,
    min: usize,
    max: usize,
) -> Result<&'a str, SubmitError> {
    let value = value
        .map(str::trim)
        .ok_or_else(|| SubmitError::InvalidInput(format!("\"{field}\" is required")))?;
    if value.is_empty() {
        return Err(SubmitError::InvalidInput(format!(
            "\"{field}\" is not allowed to be empty"
        )));
    }
    let len = value.chars().count();
    if len < min {
        return Err(SubmitError::InvalidInput(format!(
            "\"{field}\" length must be at least {min} characters long"
        )));
    }
    if len > max {
        return Err(too_long(field, max));
    }
    Ok(value)
}

fn too_long(field: &str, max: usize) -> SubmitError {
    SubmitError::InvalidInput(format!(
        "\"{field}\" length must be less than or equal to {max} characters long"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(name: &str, phone: &str, service: &str) -> LeadSubmission {
        LeadSubmission {
            name: Some(name.into()),
            phone: Some(phone.into()),
            service: Some(service.into()),
            message: None,
        }
    }

    fn check(sub: &LeadSubmission) -> Result<NewLead, SubmitError> {
        validate_submission(sub, &ClientMeta::default(), Utc::now())
    }

    fn message_of(err: SubmitError) -> String {
        match err {
            SubmitError::InvalidInput(msg) => msg,
            other => panic!("expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn sanitize_collapses_whitespace() {
        assert_eq!(sanitize("  John   Doe  ", NAME_MAX), "John Doe");
        assert_eq!(sanitize("line\n\tbreak", NAME_MAX), "line break");
    }

    #[test]
    fn sanitize_truncates_to_field_max() {
        assert_eq!(sanitize("abcdef", 3), "abc");
    }

    #[test]
    fn valid_submission_is_sanitized() {
        let lead = check(&submission("  John   Doe  ", "+1 (234) 567-890", " Deep   clean ")).unwrap();
        assert_eq!(lead.name, "John Doe");
        assert_eq!(lead.phone, "+1 (234) 567-890");
        assert_eq!(lead.service, "Deep clean");
        assert_eq!(lead.message, "");
    }

    #[test]
    fn missing_fields_are_reported_in_order() {
        let mut sub = submission("Jane", "+1 234 567", "Cleaning");
        sub.name = None;
        sub.phone = None;
        assert_eq!(message_of(check(&sub).unwrap_err()), "\"name\" is required");

        let mut sub = submission("Jane", "+1 234 567", "Cleaning");
        sub.service = None;
        assert_eq!(message_of(check(&sub).unwrap_err()), "\"service\" is required");
    }

    #[test]
    fn blank_name_is_empty_not_missing() {
        let err = check(&submission("   ", "+1 234 567", "Cleaning")).unwrap_err();
        assert_eq!(message_of(err), "\"name\" is not allowed to be empty");
    }

    #[test]
    fn length_bounds_are_enforced() {
        let err = check(&submission("J", "+1 234 567", "Cleaning")).unwrap_err();
        assert_eq!(message_of(err), "\"name\" length must be at least 2 characters long");

        let long = "x".repeat(NAME_MAX + 1);
        let err = check(&submission(&long, "+1 234 567", "Cleaning")).unwrap_err();
        assert!(message_of(err).contains("less than or equal to 150"));
    }

    #[test]
    fn bad_phone_mentions_phone() {
        for phone in ["abc123456", "+1 234 56x", "12345-", "++12345678"] {
            let err = check(&submission("Jane", phone, "Cleaning")).unwrap_err();
            assert!(
                message_of(err).to_lowercase().contains("phone"),
                "phone {phone:?} should be rejected"
            );
        }
    }

    #[test]
    fn short_phone_fails_length_check() {
        let err = check(&submission("Jane", "12345", "Cleaning")).unwrap_err();
        assert!(message_of(err).contains("\"phone\" length must be at least 6"));
    }

    #[test]
    fn accepted_phone_shapes() {
        for phone in ["+1 2345", "9876543210", "555 (010) 0199", "+91 98765.43210"] {
            assert!(check(&submission("Jane", phone, "Cleaning")).is_ok(), "{phone}");
        }
    }

    #[test]
    fn message_is_optional_but_bounded() {
        let mut sub = submission("Jane", "+1 234 567", "Cleaning");
        sub.message = Some("".into());
        assert!(check(&sub).is_ok());

        sub.message = Some("y".repeat(MESSAGE_MAX + 1));
        let err = check(&sub).unwrap_err();
        assert!(message_of(err).contains("\"message\""));
    }

    #[test]
    fn client_meta_is_carried_through() {
        let client = ClientMeta {
            ip: "203.0.113.7".into(),
            user_agent: "curl/8".into(),
            referrer: "https://example.com/contact".into(),
        };
        let lead =
            validate_submission(&submission("Jane", "+1 234 567", "Cleaning"), &client, Utc::now())
                .unwrap();
        assert_eq!(lead.ip, "203.0.113.7");
        assert_eq!(lead.user_agent, "curl/8");
        assert_eq!(lead.referrer, "https://example.com/contact");
    }
}
