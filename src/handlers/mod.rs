pub mod auth;
pub mod history;
pub mod messages;
pub mod users;
pub mod ws;
