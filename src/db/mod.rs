use std::error::Error as StdError;

use async_trait::async_trait;
use derive_more::{Display, From};

/// Declares a UUID-backed identifier stored as a PostgreSQL `UUID`.
macro_rules! uuid_id {
    ($(#[$meta:meta])*) => {
        $(#[$meta])*
        #[derive(
            Clone,
            Copy,
            Debug,
            Default,
            ::serde::Deserialize,
            ::derive_more::Display,
            Eq,
            Hash,
            Ord,
            PartialEq,
            PartialOrd,
            ::serde::Serialize,
        )]
        pub struct Id(::uuid::Uuid);

        impl Id {
            pub fn new() -> Self {
                Self(::uuid::Uuid::new_v4())
            }
        }

        impl From<u128> for Id {
            fn from(value: u128) -> Self {
                Self(::uuid::Uuid::from_u128(value))
            }
        }

        impl ::tokio_postgres::types::FromSql<'_> for Id {
            ::tokio_postgres::types::accepts!(UUID);

            fn from_sql(
                ty: &::tokio_postgres::types::Type,
                raw: &[u8],
            ) -> Result<Self, Box<dyn ::std::error::Error + Sync + Send>> {
                <::uuid::Uuid as ::tokio_postgres::types::FromSql>::from_sql(
                    ty, raw,
                )
                .map(Self)
            }
        }

        impl ::tokio_postgres::types::ToSql for Id {
            ::tokio_postgres::types::accepts!(UUID);

            ::tokio_postgres::types::to_sql_checked!();

            fn to_sql(
                &self,
                ty: &::tokio_postgres::types::Type,
                out: &mut ::tokio_postgres::types::private::BytesMut,
            ) -> Result<
                ::tokio_postgres::types::IsNull,
                Box<dyn ::std::error::Error + Sync + Send>,
            > {
                ::tokio_postgres::types::ToSql::to_sql(&self.0, ty, out)
            }
        }
    };
}

pub mod department;
pub mod memory;
pub mod postgres;
pub mod ticket;
pub mod user;

pub use self::{
    department::Department,
    memory::Memory,
    postgres::{connect, Connection, Postgres},
    ticket::Ticket,
    user::User,
};

#[derive(Debug, Display, From)]
pub enum Error {
    #[from]
    #[display("database failure: {_0}")]
    Postgres(tokio_postgres::Error),

    /// The stored ticket no longer carries the version it was read with.
    #[display("ticket {_0} was modified concurrently")]
    StaleTicket(ticket::Id),
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Postgres(e) => Some(e),
            Self::StaleTicket(_) => None,
        }
    }
}

/// Source of transactions over tickets, users and departments.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    type Transaction: Transaction;

    async fn begin(&self) -> Result<Self::Transaction, Error>;
}

/// A single unit of work.
///
/// Nothing written through a transaction is visible to others until
/// [`Transaction::commit`]. Dropping a transaction without committing it
/// rolls it back.
#[async_trait]
pub trait Transaction: Send + 'static {
    async fn ticket(&mut self, id: ticket::Id)
        -> Result<Option<Ticket>, Error>;

    /// Tickets matching `filter`, newest first.
    async fn tickets(
        &mut self,
        filter: &ticket::Filter,
    ) -> Result<Vec<Ticket>, Error>;

    async fn insert_ticket(&mut self, ticket: &Ticket) -> Result<(), Error>;

    /// Writes `ticket` back if its stored version still equals
    /// `ticket.version`, and bumps the version on success.
    async fn update_ticket(&mut self, ticket: &mut Ticket)
        -> Result<(), Error>;

    /// Removes `ticket` if its stored version still equals `ticket.version`.
    async fn delete_ticket(&mut self, ticket: &Ticket) -> Result<(), Error>;

    async fn user(&mut self, id: user::Id) -> Result<Option<User>, Error>;

    async fn department(
        &mut self,
        id: department::Id,
    ) -> Result<Option<Department>, Error>;

    async fn departments(
        &mut self,
        is_specific: bool,
    ) -> Result<Vec<Department>, Error>;

    /// Active users of the department in enumeration order, with their
    /// pending load.
    async fn members(
        &mut self,
        department: department::Id,
    ) -> Result<Vec<user::Member>, Error>;

    async fn commit(self) -> Result<(), Error>;

    async fn rollback(self) -> Result<(), Error>;
}
