//! Ticket workflow: lifecycle transitions and automatic distribution.
//!
//! Every public operation of [`Service`] runs in its own transaction. A
//! failed operation is rolled back, logged and reported as an [`Error`];
//! nothing it wrote becomes visible.

mod distribution;
mod lifecycle;

use std::{
    error::Error as StdError, future::Future, sync::Mutex, time::Duration,
};

use derive_more::Display;
use rand::{rngs::StdRng, SeedableRng as _};
use tokio::time;
use tracing::field;

use crate::db::{
    self, department, ticket, user, Store, Ticket, Transaction as _, User,
};

pub use self::{distribution::Workload, lifecycle::Changes};

#[derive(Debug, Display)]
pub enum Error {
    #[display("{_0} not found")]
    NotFound(Entity),

    #[display("{_0}")]
    Validation(&'static str),

    #[display("{_0}")]
    Authorization(&'static str),

    #[display("{_0}")]
    Conflict(String),

    #[display("{_0}")]
    Persistence(db::Error),

    #[display("operation timed out")]
    TimedOut,
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Persistence(e) => Some(e),
            _ => None,
        }
    }
}

impl From<db::Error> for Error {
    fn from(e: db::Error) -> Self {
        match e {
            db::Error::StaleTicket(_) => Self::Conflict(e.to_string()),
            db::Error::Postgres(_) => Self::Persistence(e),
        }
    }
}

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum Entity {
    #[display("ticket {_0}")]
    Ticket(ticket::Id),

    #[display("user {_0}")]
    User(user::Id),

    #[display("department {_0}")]
    Department(department::Id),
}

pub struct Service<S> {
    store: S,

    /// Shuffles distribution backlogs.
    rng: Mutex<StdRng>,

    /// Serializes distribution runs of this process.
    distribution: tokio::sync::Mutex<()>,

    timeout: Duration,
}

impl<S: Store> Service<S> {
    pub fn new(store: S) -> Self {
        Self::with_rng(store, StdRng::from_entropy())
    }

    pub fn with_rng(store: S, rng: StdRng) -> Self {
        Self {
            store,
            rng: Mutex::new(rng),
            distribution: tokio::sync::Mutex::new(()),
            timeout: Duration::from_secs(10),
        }
    }

    /// Bounds every operation, commit excluded.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn create_ticket(
        &self,
        title: String,
        text: String,
        department: department::Id,
        creator: user::Id,
        kind: ticket::Kind,
    ) -> Result<ticket::Id, Error> {
        let mut tx = self.begin("create_ticket", creator).await?;
        let result = self
            .bounded(lifecycle::create(
                &mut tx, title, text, department, creator, kind,
            ))
            .await;
        self.finish(tx, result, "create_ticket", creator).await
    }

    pub async fn update_ticket(
        &self,
        id: ticket::Id,
        sender: user::Id,
        changes: Changes,
    ) -> Result<ticket::Id, Error> {
        let mut tx = self.begin("update_ticket", sender).await?;
        let result = self
            .bounded(lifecycle::update(&mut tx, id, sender, changes))
            .await;
        self.finish(tx, result, "update_ticket", sender).await
    }

    pub async fn delete_ticket(
        &self,
        id: ticket::Id,
        user: user::Id,
    ) -> Result<ticket::Id, Error> {
        let mut tx = self.begin("delete_ticket", user).await?;
        let result = self.bounded(lifecycle::delete(&mut tx, id, user)).await;
        self.finish(tx, result, "delete_ticket", user).await
    }

    pub async fn take_to_work(
        &self,
        id: ticket::Id,
        assignee: user::Id,
    ) -> Result<ticket::Id, Error> {
        let mut tx = self.begin("take_to_work", assignee).await?;
        let result = self
            .bounded(lifecycle::take_to_work(&mut tx, id, assignee))
            .await;
        self.finish(tx, result, "take_to_work", assignee).await
    }

    pub async fn complete_ticket(
        &self,
        id: ticket::Id,
        assignee: user::Id,
        feedback: String,
    ) -> Result<ticket::Id, Error> {
        let mut tx = self.begin("complete_ticket", assignee).await?;
        let result = self
            .bounded(lifecycle::close(
                &mut tx,
                id,
                assignee,
                feedback,
                ticket::Status::Completed,
            ))
            .await;
        self.finish(tx, result, "complete_ticket", assignee).await
    }

    pub async fn reject_ticket(
        &self,
        id: ticket::Id,
        assignee: user::Id,
        feedback: String,
    ) -> Result<ticket::Id, Error> {
        let mut tx = self.begin("reject_ticket", assignee).await?;
        let result = self
            .bounded(lifecycle::close(
                &mut tx,
                id,
                assignee,
                feedback,
                ticket::Status::Rejected,
            ))
            .await;
        self.finish(tx, result, "reject_ticket", assignee).await
    }

    /// Assigns the backlog of every specialized department to its least
    /// loaded active members. Returns the number of assigned tickets.
    ///
    /// All departments are committed together or not at all.
    pub async fn distribute_all(&self) -> Result<usize, Error> {
        let _running = self.distribution.lock().await;

        let mut tx = self.begin("distribute_all", None).await?;
        let result = self
            .bounded(distribution::distribute_all(&mut tx, &self.rng))
            .await;
        self.finish(tx, result, "distribute_all", None).await
    }

    pub async fn distribute_one(
        &self,
        user: user::Id,
        ticket: ticket::Id,
    ) -> Result<bool, Error> {
        let mut tx = self.begin("distribute_one", user).await?;
        let result = self
            .bounded(distribution::distribute_one(&mut tx, user, ticket))
            .await;
        self.finish(tx, result, "distribute_one", user).await
    }

    pub async fn workload(&self) -> Result<Vec<Workload>, Error> {
        let mut tx = self.begin("workload", None).await?;
        let result = self.bounded(distribution::workload(&mut tx)).await;
        self.finish(tx, result, "workload", None).await
    }

    pub async fn ticket(&self, id: ticket::Id) -> Result<Ticket, Error> {
        let mut tx = self.begin("ticket", None).await?;
        let result = self.bounded(lifecycle::load_ticket(&mut tx, id)).await;
        self.finish(tx, result, "ticket", None).await
    }

    pub async fn tickets(
        &self,
        filter: ticket::Filter,
    ) -> Result<Vec<Ticket>, Error> {
        let mut tx = self.begin("tickets", None).await?;
        let result = self
            .bounded(async { tx.tickets(&filter).await.map_err(Error::from) })
            .await;
        self.finish(tx, result, "tickets", None).await
    }

    pub async fn user(&self, id: user::Id) -> Result<User, Error> {
        let mut tx = self.begin("user", None).await?;
        let result = self.bounded(lifecycle::load_user(&mut tx, id)).await;
        self.finish(tx, result, "user", None).await
    }

    async fn begin(
        &self,
        operation: &'static str,
        user: impl Into<Option<user::Id>>,
    ) -> Result<S::Transaction, Error> {
        self.store.begin().await.map_err(|e| {
            let e = Error::from(e);
            tracing::error!(
                operation,
                user_id = user.into().map(field::display),
                error = %e,
                "failed to begin transaction",
            );
            e
        })
    }

    async fn bounded<T>(
        &self,
        operation: impl Future<Output = Result<T, Error>>,
    ) -> Result<T, Error> {
        time::timeout(self.timeout, operation)
            .await
            .unwrap_or(Err(Error::TimedOut))
    }

    /// Commits `tx` if `result` is a success and rolls it back otherwise.
    async fn finish<T>(
        &self,
        tx: S::Transaction,
        result: Result<T, Error>,
        operation: &'static str,
        user: impl Into<Option<user::Id>>,
    ) -> Result<T, Error> {
        let result = match result {
            Ok(value) => tx.commit().await.map(|()| value).map_err(Error::from),
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::error!(
                        operation,
                        error = %rollback,
                        "failed to roll back transaction",
                    );
                }
                Err(e)
            }
        };
        if let Err(e) = &result {
            tracing::error!(
                operation,
                user_id = user.into().map(field::display),
                error = %e,
                "operation failed",
            );
        }
        result
    }
}
