pub mod config;
pub mod drive;
pub mod messages;
pub mod runtime;
pub mod sim;
