//! Actors, roles, data scope and permission guards

pub mod guards;
pub mod roles;
pub mod scope;

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::debug;

use crate::database::queries::Queries;
use crate::error::{ReportsError, Result};

pub use roles::Landing;
pub use scope::SchoolScope;

/// The user behind a request together with the role data of their profile.
#[derive(Debug, Clone, Serialize)]
pub struct Actor {
    pub user_id: i64,
    pub username: String,
    pub is_superuser: bool,
    pub is_active: bool,
    pub school_id: Option<i64>,
    pub district_ids: Vec<i64>,
    pub sgod_flag: bool,
    pub section_admin_codes: Vec<String>,
}

impl Actor {
    /// Resolve an actor by username. Unknown and inactive users are
    /// rejected as unauthenticated.
    pub async fn load(pool: &SqlitePool, username: &str) -> Result<Self> {
        let user = Queries::get_user_by_username(pool, username.trim())
            .await?
            .ok_or_else(|| ReportsError::Unauthorized(format!("unknown user '{}'", username)))?;
        if !user.is_active {
            return Err(ReportsError::Unauthorized(format!(
                "user '{}' is inactive",
                user.username
            )));
        }

        let profile = Queries::get_user_profile(pool, user.id).await?;
        let district_ids = if profile.is_some() {
            Queries::get_profile_district_ids(pool, user.id).await?
        } else {
            Vec::new()
        };
        debug!("Resolved actor {} (profile: {})", user.username, profile.is_some());

        Ok(match profile {
            Some(profile) => Actor {
                user_id: user.id,
                username: user.username,
                is_superuser: user.is_superuser,
                is_active: user.is_active,
                school_id: profile.school_id,
                district_ids,
                sgod_flag: profile.is_sgod_admin,
                section_admin_codes: profile.section_admin_codes,
            },
            None => Actor {
                user_id: user.id,
                username: user.username,
                is_superuser: user.is_superuser,
                is_active: user.is_active,
                school_id: None,
                district_ids,
                sgod_flag: false,
                section_admin_codes: Vec::new(),
            },
        })
    }
}
