use serde::{Deserialize, Serialize};

use crate::{api, db};

pub use crate::db::user::Id;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Id,
    pub name: String,
    pub department: Option<api::department::Id>,
    pub is_active: bool,
    pub is_admin: bool,
}

impl From<db::User> for User {
    fn from(user: db::User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            department: user.department,
            is_active: user.is_active,
            is_admin: user.is_admin,
        }
    }
}
