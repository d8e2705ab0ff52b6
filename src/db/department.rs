use tokio_postgres::Row;

#[derive(Clone, Debug, PartialEq)]
pub struct Department {
    pub id: Id,
    pub name: String,
    /// Specialized departments (support, IT) get their backlog distributed
    /// automatically among their members.
    pub is_specific: bool,
}

impl Department {
    pub(super) fn from_row(row: &Row) -> Self {
        Self {
            id: row.get("id"),
            name: row.get("name"),
            is_specific: row.get("is_specific"),
        }
    }
}

uuid_id!();
