pub mod config;
pub mod error;
pub mod forecast;
pub mod model;
pub mod persist;
pub mod poller;
pub mod secrets;
pub mod table;
