use std::{net, time};

use serde::Deserialize;

#[derive(Deserialize)]
pub struct Config {
    pub db: Db,
    pub http: Http,
    pub jwt: Jwt,
    #[serde(default)]
    pub service: Service,
}

#[derive(Deserialize)]
pub struct Db {
    pub url: String,
}

#[derive(Deserialize)]
pub struct Http {
    pub server: Server,
    pub cors: Cors,
}

#[derive(Deserialize)]
pub struct Server {
    pub addr: net::SocketAddr,
}

#[derive(Deserialize)]
pub struct Cors {
    pub allowed_origins: Vec<String>,
}

#[derive(Deserialize)]
pub struct Jwt {
    pub secret: String,
}

#[derive(Deserialize)]
pub struct Service {
    /// Upper bound for a single service operation, excluding its commit.
    #[serde(with = "humantime_serde", default = "default_operation_timeout")]
    pub operation_timeout: time::Duration,
}

impl Default for Service {
    fn default() -> Self {
        Self {
            operation_timeout: default_operation_timeout(),
        }
    }
}

fn default_operation_timeout() -> time::Duration {
    time::Duration::from_secs(10)
}
