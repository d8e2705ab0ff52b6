use std::{cmp::Reverse, sync::Arc};

use async_trait::async_trait;
use itertools::Itertools as _;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{
    department, ticket, user, Department, Error, Store, Ticket, User,
};

/// In-process [`Store`].
///
/// A transaction works on a private copy of the whole state and holds the
/// store until it finishes; committing swaps the copy in.
#[derive(Clone, Default)]
pub struct Memory(Arc<Mutex<State>>);

#[derive(Clone, Default)]
struct State {
    departments: Vec<Department>,
    users: Vec<User>,
    tickets: Vec<Ticket>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_department(&self, department: Department) {
        self.0.lock().await.departments.push(department);
    }

    pub async fn add_user(&self, user: User) {
        self.0.lock().await.users.push(user);
    }

    pub async fn add_ticket(&self, ticket: Ticket) {
        self.0.lock().await.tickets.push(ticket);
    }
}

#[async_trait]
impl Store for Memory {
    type Transaction = Transaction;

    async fn begin(&self) -> Result<Transaction, Error> {
        let committed = Arc::clone(&self.0).lock_owned().await;
        let working = committed.clone();
        Ok(Transaction { committed, working })
    }
}

pub struct Transaction {
    committed: OwnedMutexGuard<State>,
    working: State,
}

impl Transaction {
    fn position(&self, ticket: &Ticket) -> Result<usize, Error> {
        self.working
            .tickets
            .iter()
            .position(|t| t.id == ticket.id && t.version == ticket.version)
            .ok_or(Error::StaleTicket(ticket.id))
    }
}

#[async_trait]
impl super::Transaction for Transaction {
    async fn ticket(
        &mut self,
        id: ticket::Id,
    ) -> Result<Option<Ticket>, Error> {
        Ok(self.working.tickets.iter().find(|t| t.id == id).cloned())
    }

    async fn tickets(
        &mut self,
        filter: &ticket::Filter,
    ) -> Result<Vec<Ticket>, Error> {
        Ok(self
            .working
            .tickets
            .iter()
            .filter(|t| filter.matches(t))
            .sorted_by_key(|t| Reverse((t.created_at, t.id)))
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn insert_ticket(&mut self, ticket: &Ticket) -> Result<(), Error> {
        self.working.tickets.push(ticket.clone());
        Ok(())
    }

    async fn update_ticket(
        &mut self,
        ticket: &mut Ticket,
    ) -> Result<(), Error> {
        let position = self.position(ticket)?;
        ticket.version += 1;
        self.working.tickets[position] = ticket.clone();
        Ok(())
    }

    async fn delete_ticket(&mut self, ticket: &Ticket) -> Result<(), Error> {
        let position = self.position(ticket)?;
        self.working.tickets.remove(position);
        Ok(())
    }

    async fn user(&mut self, id: user::Id) -> Result<Option<User>, Error> {
        Ok(self.working.users.iter().find(|u| u.id == id).cloned())
    }

    async fn department(
        &mut self,
        id: department::Id,
    ) -> Result<Option<Department>, Error> {
        Ok(self.working.departments.iter().find(|d| d.id == id).cloned())
    }

    async fn departments(
        &mut self,
        is_specific: bool,
    ) -> Result<Vec<Department>, Error> {
        Ok(self
            .working
            .departments
            .iter()
            .filter(|d| d.is_specific == is_specific)
            .cloned()
            .collect())
    }

    async fn members(
        &mut self,
        department: department::Id,
    ) -> Result<Vec<user::Member>, Error> {
        let tickets = &self.working.tickets;
        Ok(self
            .working
            .users
            .iter()
            .filter(|u| u.is_active && u.department == Some(department))
            .map(|u| {
                let mut pending = user::Load::default();
                tickets
                    .iter()
                    .filter(|t| {
                        t.assignee == Some(u.id)
                            && t.status == ticket::Status::Created
                    })
                    .for_each(|t| pending.count(t.kind));
                user::Member {
                    user: u.clone(),
                    pending,
                }
            })
            .collect())
    }

    async fn commit(self) -> Result<(), Error> {
        let Self {
            mut committed,
            working,
        } = self;
        *committed = working;
        Ok(())
    }

    async fn rollback(self) -> Result<(), Error> {
        Ok(())
    }
}
