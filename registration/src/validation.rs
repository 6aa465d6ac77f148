//! Form validation.
//!
//! Every check returns the user-facing message the web client shows.

use crate::types::{Affiliation, Amendment, RegistrationForm, Residence};
use thiserror::Error;

/// Message for a submission with a blank required field.
pub const MISSING_FIELDS: &str = "모든 정보를 입력해주세요. (비밀번호 포함)";

/// Message for a dormitory or study-hall status without its phone number.
pub const MISSING_RESIDENCE_PHONE: &str = "기숙사 또는 야자 번호를 입력해주세요.";

/// Message for a lookup without both keys.
pub const MISSING_LOOKUP_KEYS: &str = "이름과 학번을 모두 입력해주세요.";

/// Message for an edit with a blank required field.
pub const MISSING_AMENDMENT_FIELDS: &str =
    "이름, 전화번호, 학교 구분, 비밀번호는 필수 입력 항목입니다.";

/// Message for a blank password on edit or cancellation.
pub const MISSING_PASSWORD: &str = "비밀번호를 입력해주세요.";

/// A rejected input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ValidationError(pub &'static str);

/// Blank means empty after trimming whitespace.
#[must_use]
pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Check a new submission and return its affiliation.
///
/// # Errors
///
/// Returns [`ValidationError`] when name, student id, phone, affiliation or
/// password is blank, or when the residence needs a phone number that is
/// missing.
pub fn validate_submission(form: &RegistrationForm) -> Result<Affiliation, ValidationError> {
    let affiliation = form.affiliation.ok_or(ValidationError(MISSING_FIELDS))?;

    if [&form.name, &form.student_id, &form.phone, &form.password]
        .iter()
        .any(|field| is_blank(field))
    {
        return Err(ValidationError(MISSING_FIELDS));
    }

    if form.residence.requires_phone() && is_blank(&form.residence_phone) {
        return Err(ValidationError(MISSING_RESIDENCE_PHONE));
    }

    Ok(affiliation)
}

/// Check a self-service edit.
///
/// # Errors
///
/// Returns [`ValidationError`] when name, phone, affiliation or the
/// password is blank.
pub fn validate_amendment(
    amendment: &Amendment,
    password: &str,
) -> Result<Affiliation, ValidationError> {
    let affiliation = amendment
        .affiliation
        .ok_or(ValidationError(MISSING_AMENDMENT_FIELDS))?;

    if is_blank(&amendment.name) || is_blank(&amendment.phone) || is_blank(password) {
        return Err(ValidationError(MISSING_AMENDMENT_FIELDS));
    }

    Ok(affiliation)
}

/// Check lookup keys.
///
/// # Errors
///
/// Returns [`ValidationError`] when either key is blank.
pub fn validate_lookup(name: &str, student_id: &str) -> Result<(), ValidationError> {
    if is_blank(name) || is_blank(student_id) {
        return Err(ValidationError(MISSING_LOOKUP_KEYS));
    }
    Ok(())
}

/// Residence fields as they should be stored for `affiliation`.
///
/// Residence is only tracked for 이화여고; everyone else is reset to
/// 해당없음 with no phone.
#[must_use]
pub fn normalize_residence(
    affiliation: Affiliation,
    residence: Residence,
    residence_phone: &str,
) -> (Residence, String) {
    if affiliation.has_residence() {
        (residence, residence_phone.to_string())
    } else {
        (Residence::NotApplicable, String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn valid_form() -> RegistrationForm {
        RegistrationForm {
            name: "김이화".to_string(),
            student_id: "20250001".to_string(),
            phone: "010-1234-5678".to_string(),
            affiliation: Some(Affiliation::EwhaGirlsHigh),
            residence: Residence::NotApplicable,
            residence_phone: String::new(),
            password: "1234".to_string(),
            event_id: "1".to_string(),
        }
    }

    #[test]
    fn test_valid_submission() {
        assert_eq!(
            validate_submission(&valid_form()),
            Ok(Affiliation::EwhaGirlsHigh)
        );
    }

    #[test]
    fn test_missing_affiliation() {
        let form = RegistrationForm {
            affiliation: None,
            ..valid_form()
        };
        assert_eq!(
            validate_submission(&form),
            Err(ValidationError(MISSING_FIELDS))
        );
    }

    #[test]
    fn test_residence_requires_phone() {
        let form = RegistrationForm {
            residence: Residence::EveningStudy,
            residence_phone: "  ".to_string(),
            ..valid_form()
        };
        assert_eq!(
            validate_submission(&form),
            Err(ValidationError(MISSING_RESIDENCE_PHONE))
        );

        let form = RegistrationForm {
            residence: Residence::Dormitory,
            residence_phone: "02-123-4567".to_string(),
            ..valid_form()
        };
        assert!(validate_submission(&form).is_ok());
    }

    #[test]
    fn test_amendment_requires_password() {
        let amendment = Amendment {
            name: "김이화".to_string(),
            phone: "010".to_string(),
            affiliation: Some(Affiliation::Graduate),
            ..Amendment::default()
        };
        assert!(validate_amendment(&amendment, "pw").is_ok());
        assert_eq!(
            validate_amendment(&amendment, ""),
            Err(ValidationError(MISSING_AMENDMENT_FIELDS))
        );
    }

    #[test]
    fn test_lookup_keys() {
        assert!(validate_lookup("김이화", "20250001").is_ok());
        assert_eq!(
            validate_lookup("김이화", ""),
            Err(ValidationError(MISSING_LOOKUP_KEYS))
        );
    }

    #[test]
    fn test_normalize_residence() {
        assert_eq!(
            normalize_residence(Affiliation::EwhaGirlsHigh, Residence::Dormitory, "02"),
            (Residence::Dormitory, "02".to_string())
        );
        assert_eq!(
            normalize_residence(Affiliation::Graduate, Residence::Dormitory, "02"),
            (Residence::NotApplicable, String::new())
        );
    }

    proptest! {
        #[test]
        fn prop_whitespace_fields_are_blank(name in "[ \t\n]{0,8}") {
            let form = RegistrationForm { name, ..valid_form() };
            prop_assert_eq!(validate_submission(&form), Err(ValidationError(MISSING_FIELDS)));
        }

        #[test]
        fn prop_non_blank_fields_pass(
            name in "[가-힣a-z]{1,8}",
            student_id in "[0-9]{8}",
            password in "[a-zA-Z0-9]{1,16}",
        ) {
            let form = RegistrationForm { name, student_id, password, ..valid_form() };
            prop_assert!(validate_submission(&form).is_ok());
        }
    }
}
