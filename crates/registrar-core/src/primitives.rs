//! # Primitives
//!
//! Typed identifiers and input normalization shared by every record.
//!
//! Identifiers are `u64` newtypes allocated from per-kind sequences in the
//! store, so an id on its own never says which tenant it belongs to.

use crate::error::{RegistrarError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// TYPED IDS
// =============================================================================

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Raw numeric value.
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// Identifies an institution (the tenant).
    InstitutionId
);
id_type!(
    /// Identifies an academic program within an institution.
    ProgramId
);
id_type!(
    /// Identifies a user account.
    UserId
);
id_type!(
    /// Identifies a catalog course.
    CourseId
);
id_type!(
    /// Identifies a Course Learning Outcome.
    OutcomeId
);
id_type!(
    /// Identifies an academic term.
    TermId
);
id_type!(
    /// Identifies a course offered in a term.
    OfferingId
);
id_type!(
    /// Identifies a section of an offering.
    SectionId
);
id_type!(
    /// Identifies a CLO assessment of a section.
    AssessmentId
);

// =============================================================================
// NORMALIZATION
// =============================================================================

/// Normalize a course number to `PREFIX NUMBER` form.
///
/// Handles `"cs 101"`, `"CS101"`, `"  math   2510 "` and suffixed numbers like
/// `"BIO 101L"`.
pub fn normalize_course_number(input: &str) -> Result<String> {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return Err(RegistrarError::validation("course number is required"));
    }
    let upper = collapsed.to_uppercase();

    if upper.contains(' ') {
        return Ok(upper);
    }

    // Split a glued prefix from its digits: "CS101" -> "CS 101"
    match upper.find(|c: char| c.is_ascii_digit()) {
        Some(idx) if idx > 0 && upper[..idx].chars().all(|c| c.is_ascii_alphabetic()) => {
            Ok(format!("{} {}", &upper[..idx], &upper[idx..]))
        }
        _ => Ok(upper),
    }
}

/// Normalize an email address to lowercase and check its basic shape.
pub fn normalize_email(input: &str) -> Result<String> {
    let email = input.trim().to_lowercase();
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(RegistrarError::validation(format!(
            "invalid email address: '{}'",
            input.trim()
        )));
    };
    if local.is_empty() || domain.is_empty() || email.contains(char::is_whitespace) {
        return Err(RegistrarError::validation(format!(
            "invalid email address: '{}'",
            input.trim()
        )));
    }
    Ok(email)
}

/// Normalize an institution or program short name.
pub fn normalize_short_name(input: &str) -> Result<String> {
    let name = input.trim().to_uppercase();
    if name.is_empty() {
        return Err(RegistrarError::validation("short name is required"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(RegistrarError::validation(format!(
            "short name '{name}' may only contain letters, digits, '-' and '_'"
        )));
    }
    Ok(name)
}

/// Trim a required free-text field, rejecting empty values.
pub fn require_text(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(RegistrarError::validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

/// Trim an optional free-text field, mapping blank to `None`.
#[must_use]
pub fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn course_number_normalization() {
        assert_eq!(normalize_course_number("cs 101").ok(), Some("CS 101".into()));
        assert_eq!(normalize_course_number("CS101").ok(), Some("CS 101".into()));
        assert_eq!(
            normalize_course_number("  math   2510 ").ok(),
            Some("MATH 2510".into())
        );
        assert_eq!(normalize_course_number("bio101l").ok(), Some("BIO 101L".into()));
        assert_eq!(normalize_course_number("4410").ok(), Some("4410".into()));
        assert!(normalize_course_number("   ").is_err());
    }

    #[test]
    fn email_normalization() {
        assert_eq!(
            normalize_email(" Ann@X.EDU ").ok(),
            Some("ann@x.edu".to_string())
        );
        assert!(normalize_email("no-at-sign").is_err());
        assert!(normalize_email("a@b@c").is_err());
        assert!(normalize_email("@x.edu").is_err());
        assert!(normalize_email("ann@").is_err());
        assert!(normalize_email("a nn@x.edu").is_err());
    }

    #[test]
    fn short_name_normalization() {
        assert_eq!(normalize_short_name(" mcc ").ok(), Some("MCC".into()));
        assert_eq!(normalize_short_name("cei_2").ok(), Some("CEI_2".into()));
        assert!(normalize_short_name("").is_err());
        assert!(normalize_short_name("a b").is_err());
    }

    #[test]
    fn optional_text_blank_is_none() {
        assert_eq!(optional_text(Some("   ")), None);
        assert_eq!(optional_text(None), None);
        assert_eq!(optional_text(Some(" quiz ")), Some("quiz".into()));
    }

    #[test]
    fn ids_display_as_numbers() {
        assert_eq!(CourseId(7).to_string(), "7");
        assert_eq!(SectionId::from(9).get(), 9);
    }
}
