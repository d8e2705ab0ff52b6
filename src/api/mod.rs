pub mod department;
pub mod distribution;
pub mod ticket;
pub mod user;

use serde::{Deserialize, Serialize};

pub use self::{department::Department, ticket::Ticket, user::User};

/// Body of every failed request.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Error {
    pub error: String,
}
