use std::collections::BTreeSet;

use serde::Serialize;
use sqlx::SqlitePool;

use super::Actor;
use crate::database::models::{School, Submission};
use crate::database::queries::Queries;
use crate::error::Result;

/// Set of schools whose data an actor may see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "school_ids", rename_all = "snake_case")]
pub enum SchoolScope {
    All,
    Only(BTreeSet<i64>),
}

impl SchoolScope {
    pub fn none() -> Self {
        SchoolScope::Only(BTreeSet::new())
    }

    /// SGOD admins and section admins see everything; a school head sees
    /// their school; a PSDS sees the schools of their districts.
    pub fn resolve(actor: &Actor, schools: &[School]) -> Self {
        if !actor.is_active {
            return Self::none();
        }
        if actor.is_sgod_admin() || actor.is_section_admin(None) {
            return SchoolScope::All;
        }
        if let Some(school_id) = actor.school_id {
            return SchoolScope::Only(BTreeSet::from([school_id]));
        }
        if !actor.district_ids.is_empty() {
            let ids = schools
                .iter()
                .filter(|s| {
                    s.district_id
                        .map(|d| actor.district_ids.contains(&d))
                        .unwrap_or(false)
                })
                .map(|s| s.id)
                .collect();
            return SchoolScope::Only(ids);
        }
        Self::none()
    }

    pub fn contains(&self, school_id: i64) -> bool {
        match self {
            SchoolScope::All => true,
            SchoolScope::Only(ids) => ids.contains(&school_id),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, SchoolScope::Only(ids) if ids.is_empty())
    }

    pub fn filter_schools(&self, schools: Vec<School>) -> Vec<School> {
        schools.into_iter().filter(|s| self.contains(s.id)).collect()
    }
}

pub async fn scope_schools(pool: &SqlitePool, actor: &Actor) -> Result<SchoolScope> {
    if actor.is_sgod_admin() || actor.is_section_admin(None) {
        return Ok(SchoolScope::All);
    }
    let schools = Queries::list_schools(pool).await?;
    Ok(SchoolScope::resolve(actor, &schools))
}

/// Schools visible to the actor, ordered by name.
pub async fn scoped_schools(pool: &SqlitePool, actor: &Actor) -> Result<Vec<School>> {
    let schools = Queries::list_schools(pool).await?;
    let scope = SchoolScope::resolve(actor, &schools);
    Ok(scope.filter_schools(schools))
}

pub async fn scope_submissions(pool: &SqlitePool, actor: &Actor) -> Result<Vec<Submission>> {
    let scope = scope_schools(pool, actor).await?;
    if scope.is_empty() {
        return Ok(Vec::new());
    }
    let submissions = Queries::list_submissions(pool).await?;
    Ok(submissions
        .into_iter()
        .filter(|s| scope.contains(s.school_id))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor() -> Actor {
        Actor {
            user_id: 7,
            username: "viewer".to_string(),
            is_superuser: false,
            is_active: true,
            school_id: None,
            district_ids: Vec::new(),
            sgod_flag: false,
            section_admin_codes: Vec::new(),
        }
    }

    fn school(id: i64, district_id: Option<i64>) -> School {
        School {
            id,
            code: format!("S{}", id),
            name: format!("School {}", id),
            division: String::new(),
            district_id,
            school_type: String::new(),
            min_grade: None,
            max_grade: None,
            implements_adm: false,
        }
    }

    fn schools() -> Vec<School> {
        vec![school(1, Some(10)), school(2, Some(10)), school(3, Some(20)), school(4, None)]
    }

    #[test]
    fn test_school_head_sees_own_school() {
        let mut a = actor();
        a.school_id = Some(3);
        let scope = SchoolScope::resolve(&a, &schools());
        assert!(scope.contains(3));
        assert!(!scope.contains(1));
    }

    #[test]
    fn test_psds_sees_district_schools() {
        let mut a = actor();
        a.district_ids = vec![10];
        let scope = SchoolScope::resolve(&a, &schools());
        assert_eq!(scope, SchoolScope::Only(BTreeSet::from([1, 2])));
    }

    #[test]
    fn test_section_admin_and_sgod_see_all() {
        let mut a = actor();
        a.section_admin_codes = vec!["smme".to_string()];
        assert_eq!(SchoolScope::resolve(&a, &schools()), SchoolScope::All);

        let mut b = actor();
        b.sgod_flag = true;
        assert_eq!(SchoolScope::resolve(&b, &schools()), SchoolScope::All);
    }

    #[test]
    fn test_no_role_or_inactive_sees_nothing() {
        assert!(SchoolScope::resolve(&actor(), &schools()).is_empty());

        let mut a = actor();
        a.sgod_flag = true;
        a.is_active = false;
        assert!(SchoolScope::resolve(&a, &schools()).is_empty());
    }
}
