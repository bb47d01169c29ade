pub mod api;
pub mod capture;
pub mod config;
pub mod flow;
pub mod registration;
