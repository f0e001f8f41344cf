// Embedded SQL migrations, applied in order by `Database::run_migrations`.
// Every statement is idempotent so startup can apply them unconditionally.

pub const INITIAL_SCHEMA: &str = include_str!("../../migrations/001_initial_schema.sql");
pub const FORM_ROWS_SCHEMA: &str = include_str!("../../migrations/002_form_rows.sql");
pub const NOTIFICATIONS_SCHEMA: &str = include_str!("../../migrations/003_notifications.sql");
pub const FORM_PLANS_SCHEMA: &str = include_str!("../../migrations/004_form_plans.sql");

pub const MIGRATIONS: &[(&str, &str)] = &[
    ("001_initial_schema", INITIAL_SCHEMA),
    ("002_form_rows", FORM_ROWS_SCHEMA),
    ("003_notifications", NOTIFICATIONS_SCHEMA),
    ("004_form_plans", FORM_PLANS_SCHEMA),
];
