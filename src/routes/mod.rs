//! HTTP routes for wicket

pub mod health;
pub mod users;

pub use health::{health_check, version_info};
pub use users::{error_response, handle_users_request, json_response};
