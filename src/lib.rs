pub mod auth;
pub mod common_issues;
pub mod config;
pub mod dashboards;
pub mod main_module;
pub mod notifications;
pub mod shared;
pub mod tickets;
