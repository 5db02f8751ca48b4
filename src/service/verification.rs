// service/verification.rs
//
// The two handshake codes: a 4-digit start code the customer reads out to
// the hustler at handoff, and a 6-digit completion code the hustler shows
// the customer when the work is done. Codes are single-use; a consumed code
// reports "already used" rather than "invalid".
use chrono::{DateTime, Utc};
use subtle::ConstantTimeEq;

use crate::{
    models::jobmodel::CodeSlot,
    service::error::ServiceError,
    utils::code_generator::{generate_completion_code, generate_start_code},
};

pub fn new_start_slot(now: DateTime<Utc>) -> CodeSlot {
    CodeSlot::new(generate_start_code(), now)
}

pub fn new_completion_slot(now: DateTime<Utc>) -> CodeSlot {
    CodeSlot::new(generate_completion_code(), now)
}

/// Strip everything but ASCII digits so "12-34" and "12 34" match "1234".
pub fn normalize_code(input: &str) -> String {
    input.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Validate a submitted code against a stored slot.
///
/// `which` names the handshake ("start" / "completion") in error messages.
pub fn check_code(
    slot: Option<&CodeSlot>,
    submitted: &str,
    which: &'static str,
) -> Result<(), ServiceError> {
    let slot = slot.ok_or(ServiceError::NoCodeGenerated(which))?;

    if slot.is_used() {
        return Err(ServiceError::CodeAlreadyUsed(which));
    }

    let submitted = normalize_code(submitted);
    let stored = normalize_code(&slot.code);
    if submitted.as_bytes().ct_eq(stored.as_bytes()).unwrap_u8() != 1 {
        return Err(ServiceError::Validation(format!(
            "{which} code does not match"
        )));
    }

    Ok(())
}

/// Mark a slot consumed. Idempotent on an already-consumed slot.
pub fn consume(slot: &mut CodeSlot, now: DateTime<Utc>) {
    if slot.used_at.is_none() {
        slot.used_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(code: &str) -> CodeSlot {
        CodeSlot::new(code.to_string(), Utc::now())
    }

    #[test]
    fn matching_code_passes() {
        assert!(check_code(Some(&slot("1234")), "1234", "start").is_ok());
    }

    #[test]
    fn formatting_noise_is_tolerated() {
        assert!(check_code(Some(&slot("1234")), "12-34", "start").is_ok());
        assert!(check_code(Some(&slot("987654")), " 98 76 54 ", "completion").is_ok());
    }

    #[test]
    fn wrong_code_is_a_validation_error() {
        let err = check_code(Some(&slot("1234")), "4321", "start").unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn missing_slot_is_an_explicit_error() {
        let err = check_code(None, "1234", "start").unwrap_err();
        assert!(matches!(err, ServiceError::NoCodeGenerated("start")));
    }

    #[test]
    fn consumed_code_reports_already_used_not_invalid() {
        let mut s = slot("1234");
        consume(&mut s, Utc::now());
        let err = check_code(Some(&s), "1234", "start").unwrap_err();
        assert!(matches!(err, ServiceError::CodeAlreadyUsed("start")));
    }

    #[test]
    fn consume_is_idempotent() {
        let mut s = slot("1234");
        let first = Utc::now();
        consume(&mut s, first);
        let stamped = s.used_at;
        consume(&mut s, Utc::now());
        assert_eq!(s.used_at, stamped);
    }
}
