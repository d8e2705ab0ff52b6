use tokio_postgres::Row;

use super::{department, ticket};

#[derive(Clone, Debug, PartialEq)]
pub struct User {
    pub id: Id,
    pub name: String,
    pub department: Option<department::Id>,
    /// Only active users take tickets.
    pub is_active: bool,
    /// Admins act across departments.
    pub is_admin: bool,
}

impl User {
    pub(super) fn from_row(row: &Row) -> Self {
        Self {
            id: row.get("id"),
            name: row.get("name"),
            department: row.get("department_id"),
            is_active: row.get("is_active"),
            is_admin: row.get("is_admin"),
        }
    }
}

uuid_id!();

/// Active department member together with their pending load.
#[derive(Clone, Debug, PartialEq)]
pub struct Member {
    pub user: User,
    pub pending: Load,
}

/// Tickets assigned to a user that are still in [`ticket::Status::Created`],
/// split by kind.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Load {
    pub problem_cases: usize,
    pub suggestions: usize,
}

impl Load {
    pub fn total(&self) -> usize {
        self.problem_cases + self.suggestions
    }

    pub fn count(&mut self, kind: ticket::Kind) {
        match kind {
            ticket::Kind::ProblemCase => self.problem_cases += 1,
            ticket::Kind::Suggestion => self.suggestions += 1,
        }
    }
}
