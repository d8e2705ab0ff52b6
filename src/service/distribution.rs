use std::{
    cmp::Reverse,
    collections::BinaryHeap,
    sync::{Mutex, PoisonError},
};

use itertools::Itertools as _;
use rand::{seq::SliceRandom as _, Rng};

use crate::db::{ticket, user, Department, Transaction};

use super::{
    lifecycle::{ensure_may_handle, load_ticket, load_user},
    Error,
};

/// Shuffles `pool` and deals it out one item at a time, always to the
/// currently least loaded entry of `loads`.
///
/// Returns every item of `pool` paired with the index of its receiver in
/// `loads`, in dealing order. Equal loads go to the lower index first. An
/// empty `loads` receives nothing.
fn plan<T, R: Rng + ?Sized>(
    mut pool: Vec<T>,
    loads: &[usize],
    rng: &mut R,
) -> Vec<(T, usize)> {
    pool.shuffle(rng);

    let mut queue = loads
        .iter()
        .enumerate()
        .map(|(receiver, &load)| Reverse((load, receiver)))
        .collect::<BinaryHeap<_>>();

    pool.into_iter()
        .map_while(|item| {
            let Reverse((load, receiver)) = queue.pop()?;
            queue.push(Reverse((load + 1, receiver)));
            Some((item, receiver))
        })
        .collect()
}

pub(super) async fn distribute_all<T: Transaction>(
    tx: &mut T,
    rng: &Mutex<impl Rng>,
) -> Result<usize, Error> {
    let mut distributed = 0;

    for department in tx.departments(true).await? {
        let backlog =
            tx.tickets(&ticket::Filter::backlog(department.id)).await?;
        if backlog.is_empty() {
            continue;
        }

        let members = tx.members(department.id).await?;
        if members.is_empty() {
            tracing::warn!(
                department_id = %department.id,
                backlog = backlog.len(),
                "no active users to distribute tickets to",
            );
            continue;
        }

        let loads = members
            .iter()
            .map(|m| m.pending.total())
            .collect::<Vec<_>>();
        let assignments = {
            let mut rng = rng.lock().unwrap_or_else(PoisonError::into_inner);
            plan(backlog, &loads, &mut *rng)
        };

        let count = assignments.len();
        for (mut ticket, receiver) in assignments {
            ticket.assignee = Some(members[receiver].user.id);
            ticket.status = ticket::Status::InWork;
            tx.update_ticket(&mut ticket).await?;
        }

        tracing::info!(
            department_id = %department.id,
            distributed = count,
            users = members.len(),
            "tickets distributed",
        );
        distributed += count;
    }

    Ok(distributed)
}

pub(super) async fn distribute_one<T: Transaction>(
    tx: &mut T,
    user: user::Id,
    ticket: ticket::Id,
) -> Result<bool, Error> {
    let mut ticket = load_ticket(tx, ticket).await?;
    let user = load_user(tx, user).await?;

    if !user.is_active {
        return Err(Error::Validation("user is not active"));
    }
    if ticket.assignee.is_some() && ticket.status != ticket::Status::Created {
        return Err(Error::Conflict("ticket is already being handled".into()));
    }
    ensure_may_handle(&ticket, &user)?;

    ticket.assignee = Some(user.id);
    ticket.status = ticket::Status::InWork;
    tx.update_ticket(&mut ticket).await?;

    tracing::info!(
        ticket_id = %ticket.id,
        user_id = %user.id,
        "ticket assigned",
    );
    Ok(true)
}

/// Pending load of the active members of a specialized department, most
/// loaded first.
#[derive(Clone, Debug)]
pub struct Workload {
    pub department: Department,
    pub members: Vec<user::Member>,
}

pub(super) async fn workload<T: Transaction>(
    tx: &mut T,
) -> Result<Vec<Workload>, Error> {
    let mut report = Vec::new();
    for department in tx.departments(true).await? {
        let members = tx
            .members(department.id)
            .await?
            .into_iter()
            .sorted_by_key(|m| Reverse(m.pending.total()))
            .collect();
        report.push(Workload {
            department,
            members,
        });
    }
    Ok(report)
}
