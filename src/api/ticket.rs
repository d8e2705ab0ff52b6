use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{api, db};

pub use crate::db::ticket::{Id, Kind, Status};

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: Id,
    pub title: String,
    pub text: String,
    pub feedback: Option<String>,
    pub department: api::department::Id,
    pub creator: api::user::Id,
    pub assignee: Option<api::user::Id>,
    pub status: Status,
    #[serde(rename = "type")]
    pub kind: Kind,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub closed_at: Option<OffsetDateTime>,
    pub version: i64,
}

impl From<db::Ticket> for Ticket {
    fn from(ticket: db::Ticket) -> Self {
        Self {
            id: ticket.id,
            title: ticket.title,
            text: ticket.text,
            feedback: ticket.feedback,
            department: ticket.department,
            creator: ticket.creator,
            assignee: ticket.assignee,
            status: ticket.status,
            kind: ticket.kind,
            created_at: ticket.created_at,
            closed_at: ticket.closed_at,
            version: ticket.version,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct List {
    pub tickets: Vec<Ticket>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Deleted {
    pub id: Id,
}
