use serde::{Deserialize, Serialize};

use crate::{api, db, service};

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct Distributed {
    pub distributed: usize,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct Assigned {
    pub assigned: bool,
}

/// Pending tickets of one department's active users, most loaded first.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Workload {
    pub department: api::Department,
    pub users: Vec<UserLoad>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLoad {
    pub user: api::User,
    pub problem_cases: usize,
    pub suggestions: usize,
}

impl From<service::Workload> for Workload {
    fn from(workload: service::Workload) -> Self {
        Self {
            department: workload.department.into(),
            users: workload.members.into_iter().map(UserLoad::from).collect(),
        }
    }
}

impl From<db::user::Member> for UserLoad {
    fn from(member: db::user::Member) -> Self {
        Self {
            user: member.user.into(),
            problem_cases: member.pending.problem_cases,
            suggestions: member.pending.suggestions,
        }
    }
}
