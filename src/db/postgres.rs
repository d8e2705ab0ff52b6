use std::sync::Arc;

use async_trait::async_trait;
use constcat::concat;
use tokio::{
    runtime,
    sync::{Mutex, OwnedMutexGuard},
};
use tokio_postgres::{tls::NoTlsStream, NoTls, Row, Socket};

use crate::config;

use super::{
    department, ticket, user, Department, Error, Store, Ticket, User,
};

pub type Connection = tokio_postgres::Connection<Socket, NoTlsStream>;

pub async fn connect(
    config: config::Db,
) -> Result<(Postgres, Connection), Error> {
    let (client, connection) =
        tokio_postgres::connect(&config.url, NoTls).await?;
    Ok((Postgres(Arc::new(Mutex::new(client))), connection))
}

/// [`Store`] over a single PostgreSQL connection.
///
/// Transactions take turns on the connection, so at most one is open at a
/// time.
#[derive(Clone)]
pub struct Postgres(Arc<Mutex<tokio_postgres::Client>>);

#[async_trait]
impl Store for Postgres {
    type Transaction = Transaction;

    async fn begin(&self) -> Result<Transaction, Error> {
        let client = Arc::clone(&self.0).lock_owned().await;
        client.batch_execute("BEGIN").await?;
        Ok(Transaction {
            client: Some(client),
        })
    }
}

pub struct Transaction {
    /// Taken only by `commit`/`rollback`/`drop`.
    client: Option<OwnedMutexGuard<tokio_postgres::Client>>,
}

impl Transaction {
    fn client(&self) -> &tokio_postgres::Client {
        self.client
            .as_deref()
            .unwrap_or_else(|| unreachable!("transaction is already finished"))
    }

    async fn finish(mut self, statement: &str) -> Result<(), Error> {
        if let Some(client) = self.client.take() {
            client.batch_execute(statement).await?;
        }
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        // The connection stays locked until the rollback went through.
        if let Ok(runtime) = runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = client.batch_execute("ROLLBACK").await {
                    tracing::error!(
                        error = %e,
                        "failed to roll back abandoned transaction",
                    );
                }
            });
        }
    }
}

const TICKET_COLUMNS: &str = "\
    id, title, text, feedback, department_id, creator_id, assignee_id, \
    status, kind, created_at, closed_at, version";

const USER_COLUMNS: &str = "id, name, department_id, is_active, is_admin";

const DEPARTMENT_COLUMNS: &str = "id, name, is_specific";

#[async_trait]
impl super::Transaction for Transaction {
    async fn ticket(
        &mut self,
        id: ticket::Id,
    ) -> Result<Option<Ticket>, Error> {
        const SQL: &str =
            concat!("SELECT ", TICKET_COLUMNS, " FROM tickets WHERE id = $1");
        Ok(self
            .client()
            .query_opt(SQL, &[&id])
            .await?
            .map(|row| Ticket::from_row(&row)))
    }

    async fn tickets(
        &mut self,
        filter: &ticket::Filter,
    ) -> Result<Vec<Ticket>, Error> {
        const SQL: &str = concat!(
            "SELECT ",
            TICKET_COLUMNS,
            " FROM tickets \
              WHERE ($1::UUID IS NULL OR department_id = $1) \
                AND ($2::UUID IS NULL OR creator_id = $2) \
                AND ($3::UUID IS NULL OR assignee_id = $3) \
                AND ($4::INT2 IS NULL OR status = $4) \
                AND (NOT $5 OR assignee_id IS NULL) \
              ORDER BY created_at DESC, \
                       id DESC \
              OFFSET $6 LIMIT $7",
        );

        let offset = i64::try_from(filter.offset).unwrap_or(i64::MAX);
        let limit = filter
            .limit
            .map(|limit| i64::try_from(limit).unwrap_or(i64::MAX));

        Ok(self
            .client()
            .query(
                SQL,
                &[
                    &filter.department,
                    &filter.creator,
                    &filter.assignee,
                    &filter.status,
                    &filter.unassigned_only,
                    &offset,
                    &limit,
                ],
            )
            .await?
            .iter()
            .map(Ticket::from_row)
            .collect())
    }

    async fn insert_ticket(&mut self, ticket: &Ticket) -> Result<(), Error> {
        const SQL: &str = concat!(
            "INSERT INTO tickets (",
            TICKET_COLUMNS,
            ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        );

        self.client()
            .execute(
                SQL,
                &[
                    &ticket.id,
                    &ticket.title,
                    &ticket.text,
                    &ticket.feedback,
                    &ticket.department,
                    &ticket.creator,
                    &ticket.assignee,
                    &ticket.status,
                    &ticket.kind,
                    &ticket.created_at,
                    &ticket.closed_at,
                    &ticket.version,
                ],
            )
            .await
            .map(drop)
            .map_err(Error::from)
    }

    async fn update_ticket(
        &mut self,
        ticket: &mut Ticket,
    ) -> Result<(), Error> {
        const SQL: &str = "\
            UPDATE tickets \
            SET title = $3, \
                text = $4, \
                feedback = $5, \
                department_id = $6, \
                assignee_id = $7, \
                status = $8, \
                kind = $9, \
                closed_at = $10, \
                version = version + 1 \
            WHERE id = $1 AND version = $2";

        let updated = self
            .client()
            .execute(
                SQL,
                &[
                    &ticket.id,
                    &ticket.version,
                    &ticket.title,
                    &ticket.text,
                    &ticket.feedback,
                    &ticket.department,
                    &ticket.assignee,
                    &ticket.status,
                    &ticket.kind,
                    &ticket.closed_at,
                ],
            )
            .await?;
        if updated == 0 {
            return Err(Error::StaleTicket(ticket.id));
        }

        ticket.version += 1;
        Ok(())
    }

    async fn delete_ticket(&mut self, ticket: &Ticket) -> Result<(), Error> {
        const SQL: &str = "DELETE FROM tickets WHERE id = $1 AND version = $2";

        let deleted = self
            .client()
            .execute(SQL, &[&ticket.id, &ticket.version])
            .await?;
        if deleted == 0 {
            return Err(Error::StaleTicket(ticket.id));
        }
        Ok(())
    }

    async fn user(&mut self, id: user::Id) -> Result<Option<User>, Error> {
        const SQL: &str = concat!(
            "SELECT ",
            USER_COLUMNS,
            " FROM users WHERE id = $1 LIMIT 1",
        );
        Ok(self
            .client()
            .query_opt(SQL, &[&id])
            .await?
            .map(|row| User::from_row(&row)))
    }

    async fn department(
        &mut self,
        id: department::Id,
    ) -> Result<Option<Department>, Error> {
        const SQL: &str = concat!(
            "SELECT ",
            DEPARTMENT_COLUMNS,
            " FROM departments WHERE id = $1 LIMIT 1",
        );
        Ok(self
            .client()
            .query_opt(SQL, &[&id])
            .await?
            .map(|row| Department::from_row(&row)))
    }

    async fn departments(
        &mut self,
        is_specific: bool,
    ) -> Result<Vec<Department>, Error> {
        const SQL: &str = concat!(
            "SELECT ",
            DEPARTMENT_COLUMNS,
            " FROM departments \
              WHERE is_specific = $1 \
              ORDER BY name, id",
        );
        Ok(self
            .client()
            .query(SQL, &[&is_specific])
            .await?
            .iter()
            .map(Department::from_row)
            .collect())
    }

    async fn members(
        &mut self,
        department: department::Id,
    ) -> Result<Vec<user::Member>, Error> {
        const SQL: &str = "\
            SELECT u.id, u.name, u.department_id, u.is_active, u.is_admin, \
                   COUNT(t.id) FILTER (WHERE t.kind = $3) AS problem_cases, \
                   COUNT(t.id) FILTER (WHERE t.kind = $4) AS suggestions \
            FROM users u \
            LEFT JOIN tickets t ON t.assignee_id = u.id AND t.status = $2 \
            WHERE u.department_id = $1 AND u.is_active \
            GROUP BY u.id \
            ORDER BY u.name, u.id";

        Ok(self
            .client()
            .query(
                SQL,
                &[
                    &department,
                    &ticket::Status::Created,
                    &ticket::Kind::ProblemCase,
                    &ticket::Kind::Suggestion,
                ],
            )
            .await?
            .iter()
            .map(|row| user::Member {
                user: User::from_row(row),
                pending: user::Load {
                    problem_cases: count(row, "problem_cases"),
                    suggestions: count(row, "suggestions"),
                },
            })
            .collect())
    }

    async fn commit(self) -> Result<(), Error> {
        self.finish("COMMIT").await
    }

    async fn rollback(self) -> Result<(), Error> {
        self.finish("ROLLBACK").await
    }
}

fn count(row: &Row, column: &str) -> usize {
    usize::try_from(row.get::<_, i64>(column)).unwrap_or_default()
}
