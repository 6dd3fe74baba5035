pub mod config;
pub mod platform;
pub mod protocol;
pub mod roi;
pub mod session;
