use serde::{Deserialize, Serialize};

use crate::error::ReportsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Draft,
    Submitted,
    Returned,
    Noted,
}

impl SubmissionStatus {
    pub const ALL: [SubmissionStatus; 4] = [
        SubmissionStatus::Draft,
        SubmissionStatus::Submitted,
        SubmissionStatus::Returned,
        SubmissionStatus::Noted,
    ];

    /// Statuses counted as "done" by dashboards.
    pub const COMPLETED: [SubmissionStatus; 2] = [SubmissionStatus::Submitted, SubmissionStatus::Noted];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Draft => "draft",
            SubmissionStatus::Submitted => "submitted",
            SubmissionStatus::Returned => "returned",
            SubmissionStatus::Noted => "noted",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SubmissionStatus::Draft => "Draft",
            SubmissionStatus::Submitted => "Submitted",
            SubmissionStatus::Returned => "Returned",
            SubmissionStatus::Noted => "Noted",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(SubmissionStatus::Draft),
            "submitted" => Some(SubmissionStatus::Submitted),
            "returned" => Some(SubmissionStatus::Returned),
            "noted" => Some(SubmissionStatus::Noted),
            _ => None,
        }
    }

    /// School staff may edit and (re)submit only from these states.
    pub fn is_editable(&self) -> bool {
        matches!(self, SubmissionStatus::Draft | SubmissionStatus::Returned)
    }

    pub fn is_completed(&self) -> bool {
        Self::COMPLETED.contains(self)
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A requested move in the review workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Submit,
    Return,
    Note,
    Reopen,
}

impl Transition {
    pub fn target(&self) -> SubmissionStatus {
        match self {
            Transition::Submit => SubmissionStatus::Submitted,
            Transition::Return => SubmissionStatus::Returned,
            Transition::Note => SubmissionStatus::Noted,
            Transition::Reopen => SubmissionStatus::Draft,
        }
    }

    /// Checks the source state. Errors carry the message shown to the user.
    pub fn check_from(&self, current: SubmissionStatus) -> Result<(), ReportsError> {
        match self {
            Transition::Submit if !current.is_editable() => Err(ReportsError::Conflict(
                "Submission cannot be submitted in its current state.".to_string(),
            )),
            Transition::Return if current != SubmissionStatus::Submitted => Err(
                ReportsError::Conflict("Only submitted reports may be returned.".to_string()),
            ),
            Transition::Note if current != SubmissionStatus::Submitted => Err(
                ReportsError::Conflict("Only submitted reports may be marked as noted.".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_names() {
        for status in SubmissionStatus::ALL {
            assert_eq!(SubmissionStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(SubmissionStatus::from_str(" Noted "), Some(SubmissionStatus::Noted));
        assert_eq!(SubmissionStatus::from_str("approved"), None);
    }

    #[test]
    fn test_editable_states() {
        assert!(SubmissionStatus::Draft.is_editable());
        assert!(SubmissionStatus::Returned.is_editable());
        assert!(!SubmissionStatus::Submitted.is_editable());
        assert!(!SubmissionStatus::Noted.is_editable());
    }

    #[test]
    fn test_transition_sources() {
        assert!(Transition::Submit.check_from(SubmissionStatus::Draft).is_ok());
        assert!(Transition::Submit.check_from(SubmissionStatus::Returned).is_ok());
        assert!(Transition::Submit.check_from(SubmissionStatus::Noted).is_err());
        assert!(Transition::Return.check_from(SubmissionStatus::Submitted).is_ok());
        assert!(Transition::Return.check_from(SubmissionStatus::Draft).is_err());
        assert!(Transition::Note.check_from(SubmissionStatus::Draft).is_err());
        for status in SubmissionStatus::ALL {
            assert!(Transition::Reopen.check_from(status).is_ok());
        }
    }
}
