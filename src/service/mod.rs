//! Operation orchestration

pub mod users;

pub use users::{HandlerResponse, UserService};
