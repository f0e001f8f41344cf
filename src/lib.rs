pub mod accounts;
pub mod config;
pub mod dashboards;
pub mod database;
pub mod error;
pub mod handlers;
pub mod notifications;
pub mod organizations;
pub mod review;
pub mod submissions;

pub use error::ReportsError;
