//! Configuration for wicket
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use uuid::Uuid;

/// wicket - access-control gateway for user identity records
#[derive(Parser, Debug, Clone)]
#[command(name = "wicket")]
#[command(about = "Access-control and credential-hygiene gateway for user identity records")]
pub struct Args {
    /// Unique node identifier for this gateway instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "wicket")]
    pub mongodb_db: String,

    /// Collection holding the user identity records
    #[arg(long, env = "USERS_COLLECTION", default_value = "users")]
    pub users_collection: String,

    /// Role value allowed to bypass per-owner restrictions
    #[arg(long, env = "ADMIN_ROLE", default_value = "admin")]
    pub admin_role: String,

    /// Minimum accepted login length
    #[arg(long, env = "LOGIN_MIN_LEN", default_value = "3")]
    pub login_min_len: usize,

    /// Maximum accepted login length
    #[arg(long, env = "LOGIN_MAX_LEN", default_value = "64")]
    pub login_max_len: usize,

    /// Restrict SEARCH to the admin role
    #[arg(long, env = "RESTRICTED_SEARCH", default_value = "false")]
    pub restricted_search: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.login_min_len == 0 {
            return Err("LOGIN_MIN_LEN must be at least 1".to_string());
        }

        if self.login_min_len > self.login_max_len {
            return Err("LOGIN_MIN_LEN must be less than or equal to LOGIN_MAX_LEN".to_string());
        }

        if self.admin_role.is_empty() {
            return Err("ADMIN_ROLE must not be empty".to_string());
        }

        Ok(())
    }
}
