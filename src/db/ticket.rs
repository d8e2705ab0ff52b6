use std::error::Error as StdError;

use enum_utils::TryFromRepr;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio_postgres::{
    types::{
        accepts, private::BytesMut, to_sql_checked, FromSql, IsNull, ToSql,
        Type,
    },
    Row,
};

use super::{department, user};

#[derive(Clone, Debug, PartialEq)]
pub struct Ticket {
    pub id: Id,
    pub title: String,
    pub text: String,
    /// Resolution note, present once the ticket is closed.
    pub feedback: Option<String>,
    pub department: department::Id,
    pub creator: user::Id,
    pub assignee: Option<user::Id>,
    pub status: Status,
    pub kind: Kind,
    pub created_at: OffsetDateTime,
    pub closed_at: Option<OffsetDateTime>,
    /// Optimistic concurrency token, bumped on every write.
    pub version: i64,
}

impl Ticket {
    pub fn new(
        title: String,
        text: String,
        department: department::Id,
        creator: user::Id,
        kind: Kind,
    ) -> Self {
        Self {
            id: Id::new(),
            title,
            text,
            feedback: None,
            department,
            creator,
            assignee: None,
            status: Status::Created,
            kind,
            created_at: OffsetDateTime::now_utc(),
            closed_at: None,
            version: 0,
        }
    }

    pub(super) fn from_row(row: &Row) -> Self {
        Self {
            id: row.get("id"),
            title: row.get("title"),
            text: row.get("text"),
            feedback: row.get("feedback"),
            department: row.get("department_id"),
            creator: row.get("creator_id"),
            assignee: row.get("assignee_id"),
            status: row.get("status"),
            kind: row.get("kind"),
            created_at: row.get("created_at"),
            closed_at: row.get("closed_at"),
            version: row.get("version"),
        }
    }
}

uuid_id!();

#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    TryFromRepr,
    PartialEq,
    Serialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Status {
    /// Raised by an employee, nobody works on it yet.
    Created = 1,

    /// Taken by an assignee.
    InWork = 2,

    /// Resolved, with feedback describing the resolution.
    Completed = 3,

    /// Declined, with feedback describing the reason.
    Rejected = 4,
}

impl Status {
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }
}

impl FromSql<'_> for Status {
    accepts!(INT2);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from_sql(ty, raw)?;
        let repr = u8::try_from(repr)?;
        let status = Self::try_from(repr).map_err(|_| "invalid status")?;
        Ok(status)
    }
}

impl ToSql for Status {
    accepts!(INT2);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from((*self) as u8);
        repr.to_sql(ty, out)
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    TryFromRepr,
    PartialEq,
    Serialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Kind {
    ProblemCase = 1,
    Suggestion = 2,
}

impl FromSql<'_> for Kind {
    accepts!(INT2);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from_sql(ty, raw)?;
        let repr = u8::try_from(repr)?;
        let kind = Self::try_from(repr).map_err(|_| "invalid ticket kind")?;
        Ok(kind)
    }
}

impl ToSql for Kind {
    accepts!(INT2);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from((*self) as u8);
        repr.to_sql(ty, out)
    }
}

/// Selection of tickets for [`super::Transaction::tickets`].
///
/// Unset criteria match every ticket.
#[derive(Clone, Debug, Default)]
pub struct Filter {
    pub department: Option<department::Id>,
    pub creator: Option<user::Id>,
    pub assignee: Option<user::Id>,
    pub status: Option<Status>,
    pub unassigned_only: bool,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl Filter {
    /// Backlog of a department: tickets nobody has been assigned to yet.
    pub fn backlog(department: department::Id) -> Self {
        Self {
            department: Some(department),
            status: Some(Status::Created),
            unassigned_only: true,
            ..Self::default()
        }
    }

    pub fn matches(&self, ticket: &Ticket) -> bool {
        self.department.map_or(true, |d| ticket.department == d)
            && self.creator.map_or(true, |c| ticket.creator == c)
            && self.assignee.map_or(true, |a| ticket.assignee == Some(a))
            && self.status.map_or(true, |s| ticket.status == s)
            && (!self.unassigned_only || ticket.assignee.is_none())
    }
}
