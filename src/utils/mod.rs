pub mod auth;
pub mod ids;
