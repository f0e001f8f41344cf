use std::collections::BTreeSet;

use serde::Serialize;

use super::Actor;

impl Actor {
    pub fn is_sgod_admin(&self) -> bool {
        self.is_active && (self.is_superuser || self.sgod_flag)
    }

    pub fn is_school_head(&self) -> bool {
        self.is_sgod_admin() || (self.is_active && self.school_id.is_some())
    }

    pub fn is_psds(&self) -> bool {
        self.is_sgod_admin() || (self.is_active && !self.district_ids.is_empty())
    }

    /// Without a code: administers any section. With a code: administers that
    /// section, compared case-insensitively after trimming.
    pub fn is_section_admin(&self, section_code: Option<&str>) -> bool {
        if !self.is_active {
            return false;
        }
        if self.is_sgod_admin() {
            return true;
        }
        match section_code {
            None => self.section_admin_codes.iter().any(|c| !c.trim().is_empty()),
            Some(code) => {
                let wanted = code.trim().to_lowercase();
                self.section_admin_codes
                    .iter()
                    .any(|c| c.trim().to_lowercase() == wanted)
            }
        }
    }

    pub fn is_reviewer(&self) -> bool {
        self.is_section_admin(None) || self.is_psds() || self.is_sgod_admin()
    }

    /// Upper-cased section codes from the profile.
    pub fn allowed_section_codes(&self) -> BTreeSet<String> {
        self.section_admin_codes
            .iter()
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .collect()
    }

    pub fn role_names(&self) -> Vec<&'static str> {
        let mut roles = Vec::new();
        if self.is_sgod_admin() {
            roles.push("sgod_admin");
        }
        if self.is_section_admin(None) {
            roles.push("section_admin");
        }
        if self.is_psds() {
            roles.push("psds");
        }
        if self.is_school_head() {
            roles.push("school_head");
        }
        roles
    }

    pub fn landing(&self) -> Landing {
        if self.is_sgod_admin() {
            return Landing::DivisionOverview;
        }
        if self.is_section_admin(None) {
            if let Some(code) = self.allowed_section_codes().into_iter().next() {
                return Landing::ReviewQueue {
                    section_code: code.to_lowercase(),
                };
            }
        }
        if self.is_psds() {
            return Landing::DistrictGaps;
        }
        if self.is_school_head() {
            return Landing::SchoolHome;
        }
        Landing::NoRole
    }
}

/// Where an actor starts after signing in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Landing {
    SchoolHome,
    ReviewQueue { section_code: String },
    DistrictGaps,
    DivisionOverview,
    NoRole,
}

impl Landing {
    pub fn path(&self) -> String {
        match self {
            Landing::SchoolHome => "/forms".to_string(),
            Landing::ReviewQueue { section_code } => format!("/review/{}/queue", section_code),
            Landing::DistrictGaps => "/dashboards/district-submissions".to_string(),
            Landing::DivisionOverview => "/dashboards/division-overview".to_string(),
            Landing::NoRole => "/me".to_string(),
        }
    }
}
