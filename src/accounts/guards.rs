//! Permission guards. Each returns `Forbidden` when the actor lacks the role.

use super::Actor;
use crate::error::{ReportsError, Result};

pub fn require_school_head(actor: &Actor, target_school_id: Option<i64>) -> Result<()> {
    if !actor.is_school_head() {
        return Err(ReportsError::forbidden("School Head role required."));
    }
    if actor.is_sgod_admin() {
        return Ok(());
    }
    match (actor.school_id, target_school_id) {
        (None, _) => Err(ReportsError::forbidden("No school assigned to this account.")),
        (Some(own), Some(target)) if own != target => {
            Err(ReportsError::forbidden("You cannot act for another school."))
        }
        _ => Ok(()),
    }
}

pub fn require_section_admin(actor: &Actor, section_code: Option<&str>) -> Result<()> {
    if !actor.is_section_admin(None) {
        return Err(ReportsError::forbidden("Section Admin role required."));
    }
    if actor.is_sgod_admin() {
        return Ok(());
    }
    if let Some(code) = section_code {
        if !actor.is_section_admin(Some(code)) {
            return Err(ReportsError::forbidden(format!(
                "You do not administer section '{}'.",
                code
            )));
        }
    }
    Ok(())
}

pub fn require_psds(actor: &Actor) -> Result<()> {
    if actor.is_psds() {
        Ok(())
    } else {
        Err(ReportsError::forbidden("PSDS role required."))
    }
}

pub fn require_sgod_admin(actor: &Actor) -> Result<()> {
    if actor.is_sgod_admin() {
        Ok(())
    } else {
        Err(ReportsError::forbidden("SGOD access required."))
    }
}

pub fn require_reviewer(actor: &Actor) -> Result<()> {
    if actor.is_reviewer() {
        Ok(())
    } else {
        Err(ReportsError::forbidden("Reviewer role required."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor() -> Actor {
        Actor {
            user_id: 2,
            username: "guarded".to_string(),
            is_superuser: false,
            is_active: true,
            school_id: None,
            district_ids: Vec::new(),
            sgod_flag: false,
            section_admin_codes: Vec::new(),
        }
    }

    #[test]
    fn test_school_head_must_match_target() {
        let mut a = actor();
        assert!(require_school_head(&a, None).is_err());

        a.school_id = Some(5);
        assert!(require_school_head(&a, None).is_ok());
        assert!(require_school_head(&a, Some(5)).is_ok());
        let err = require_school_head(&a, Some(6)).unwrap_err();
        assert!(matches!(err, ReportsError::Forbidden(_)));
    }

    #[test]
    fn test_sgod_passes_every_guard() {
        let mut a = actor();
        a.sgod_flag = true;
        assert!(require_school_head(&a, Some(99)).is_ok());
        assert!(require_section_admin(&a, Some("yfs")).is_ok());
        assert!(require_psds(&a).is_ok());
        assert!(require_sgod_admin(&a).is_ok());
        assert!(require_reviewer(&a).is_ok());
    }

    #[test]
    fn test_section_admin_limited_to_own_sections() {
        let mut a = actor();
        a.section_admin_codes = vec!["SMME".to_string()];
        assert!(require_section_admin(&a, None).is_ok());
        assert!(require_section_admin(&a, Some("smme")).is_ok());
        assert!(require_section_admin(&a, Some("yfs")).is_err());
        assert!(require_sgod_admin(&a).is_err());
        assert!(require_reviewer(&a).is_ok());
    }

    #[test]
    fn test_psds_is_reviewer_but_not_section_admin() {
        let mut a = actor();
        a.district_ids = vec![1];
        assert!(require_psds(&a).is_ok());
        assert!(require_reviewer(&a).is_ok());
        assert!(require_section_admin(&a, None).is_err());
    }
}
