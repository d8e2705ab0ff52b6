pub mod api;
pub mod config;
pub mod db;
pub mod http;
pub mod service;

pub use self::{config::Config, service::Service};
