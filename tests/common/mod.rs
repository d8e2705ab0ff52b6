use jsonwebtoken::{encode, EncodingKey, Header};
use rand::{rngs::StdRng, SeedableRng as _};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use ticket_desk::{
    api,
    db::{
        department, ticket, user, Department, Memory, Store, Ticket,
        Transaction as _, User,
    },
    http::{self, AuthClaims},
    Service,
};
use time::{Duration, OffsetDateTime};
use tokio::{net, task};

const JWT_SECRET: &[u8] = b"integration tests secret";

/// Specialized, with two active members and an inactive one.
pub const SUPPORT: u128 = 1;
/// Specialized, with inactive members only.
pub const IT: u128 = 2;
/// Regular, never distributed.
pub const SALES: u128 = 3;
/// Specialized, with a single active member.
pub const FACILITIES: u128 = 4;

/// Sales employee raising tickets.
pub const ALICE: u128 = 11;
pub const BOB: u128 = 12;
pub const CAROL: u128 = 13;
/// Inactive support member.
pub const DAVE: u128 = 14;
/// Admin outside of any department.
pub const ERIN: u128 = 15;
/// Inactive IT member.
pub const GINA: u128 = 16;
/// Belongs to no department.
pub const FRANK: u128 = 17;
/// Facilities member.
pub const HANK: u128 = 18;

/// Directory shared by every test, without tickets.
pub async fn world() -> Memory {
    let store = Memory::new();

    for (id, name, is_specific) in [
        (SUPPORT, "Support", true),
        (IT, "IT", true),
        (SALES, "Sales", false),
        (FACILITIES, "Facilities", true),
    ] {
        store
            .add_department(Department {
                id: department::Id::from(id),
                name: name.into(),
                is_specific,
            })
            .await;
    }

    for (id, name, department, is_active, is_admin) in [
        (ALICE, "Alice", Some(SALES), true, false),
        (BOB, "Bob", Some(SUPPORT), true, false),
        (CAROL, "Carol", Some(SUPPORT), true, false),
        (DAVE, "Dave", Some(SUPPORT), false, false),
        (ERIN, "Erin", None, true, true),
        (GINA, "Gina", Some(IT), false, false),
        (FRANK, "Frank", None, true, false),
        (HANK, "Hank", Some(FACILITIES), true, false),
    ] {
        store
            .add_user(User {
                id: user::Id::from(id),
                name: name.into(),
                department: department.map(department::Id::from),
                is_active,
                is_admin,
            })
            .await;
    }

    store
}

/// Seeds a ticket raised by Alice, optionally already assigned while still
/// [`ticket::Status::Created`].
pub async fn seed_ticket(
    store: &Memory,
    department: u128,
    kind: ticket::Kind,
    assignee: Option<u128>,
) -> ticket::Id {
    let mut ticket = Ticket::new(
        "Seeded".into(),
        "Seeded ticket".into(),
        department::Id::from(department),
        user::Id::from(ALICE),
        kind,
    );
    ticket.assignee = assignee.map(user::Id::from);
    let id = ticket.id;
    store.add_ticket(ticket).await;
    id
}

/// Every stored ticket, read straight from the store.
pub async fn stored_tickets(store: &Memory) -> Vec<Ticket> {
    let mut tx = store.begin().await.expect("failed to begin");
    let tickets = tx
        .tickets(&ticket::Filter::default())
        .await
        .expect("failed to read tickets");
    tx.rollback().await.expect("failed to roll back");
    tickets
}

/// Service over `store` with a fixed shuffle seed.
pub fn service<S: Store>(store: S) -> Service<S> {
    Service::with_rng(store, StdRng::seed_from_u64(7))
}

/// Serves the API over `store` on an ephemeral port and returns its base
/// URL.
pub async fn serve<S: Store>(store: S) -> String {
    serve_with(service(store)).await
}

pub async fn serve_with<S: Store>(service: Service<S>) -> String {
    let app = http::router(service, JWT_SECRET);

    let listener = net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind");
    let addr = listener.local_addr().expect("failed to get address");
    task::spawn(async move {
        axum::serve(listener, app).await.expect("server failed");
    });

    format!("http://{addr}")
}

pub struct Client {
    inner: reqwest::Client,
    base_url: String,
    pub auth_token: Option<String>,
}

impl Client {
    pub fn new(base_url: &str) -> Self {
        Self {
            inner: reqwest::Client::new(),
            base_url: base_url.into(),
            auth_token: None,
        }
    }

    pub fn auth(mut self, user: u128) -> Self {
        let claims = AuthClaims {
            user_id: api::user::Id::from(user),
            exp: (OffsetDateTime::now_utc() + Duration::hours(1))
                .unix_timestamp(),
        };
        self.auth_token = Some(
            encode(
                &Header::default(),
                &claims,
                &EncodingKey::from_secret(JWT_SECRET),
            )
            .expect("failed to encode token"),
        );
        self
    }

    pub async fn add_ticket(
        &self,
        title: &str,
        text: &str,
        department: u128,
        kind: &str,
    ) -> Result<api::Ticket, StatusCode> {
        self.send(self.inner.post(self.url("/ticket")).json(&json!({
            "title": title,
            "text": text,
            "departmentId": api::department::Id::from(department),
            "type": kind,
        })))
        .await
    }

    pub async fn get_ticket(
        &self,
        id: api::ticket::Id,
    ) -> Result<api::Ticket, StatusCode> {
        self.send(self.inner.get(self.url(&format!("/ticket/{id}"))))
            .await
    }

    /// `query` is appended to the URL verbatim.
    pub async fn list_tickets(
        &self,
        query: &str,
    ) -> Result<api::ticket::List, StatusCode> {
        self.send(self.inner.get(self.url(&format!("/ticket?{query}"))))
            .await
    }

    pub async fn edit_ticket(
        &self,
        id: api::ticket::Id,
        changes: serde_json::Value,
    ) -> Result<api::Ticket, StatusCode> {
        self.send(
            self.inner
                .patch(self.url(&format!("/ticket/{id}")))
                .json(&changes),
        )
        .await
    }

    pub async fn delete_ticket(
        &self,
        id: api::ticket::Id,
    ) -> Result<api::ticket::Deleted, StatusCode> {
        self.send(self.inner.delete(self.url(&format!("/ticket/{id}"))))
            .await
    }

    pub async fn take_ticket(
        &self,
        id: api::ticket::Id,
    ) -> Result<api::Ticket, StatusCode> {
        self.send(self.inner.post(self.url(&format!("/ticket/{id}/take"))))
            .await
    }

    pub async fn complete_ticket(
        &self,
        id: api::ticket::Id,
        feedback: &str,
    ) -> Result<api::Ticket, StatusCode> {
        self.send(
            self.inner
                .post(self.url(&format!("/ticket/{id}/complete")))
                .json(&json!({ "feedback": feedback })),
        )
        .await
    }

    pub async fn reject_ticket(
        &self,
        id: api::ticket::Id,
        feedback: &str,
    ) -> Result<api::Ticket, StatusCode> {
        self.send(
            self.inner
                .post(self.url(&format!("/ticket/{id}/reject")))
                .json(&json!({ "feedback": feedback })),
        )
        .await
    }

    pub async fn assign_ticket(
        &self,
        id: api::ticket::Id,
        user: u128,
    ) -> Result<api::distribution::Assigned, StatusCode> {
        self.send(
            self.inner
                .post(self.url(&format!("/ticket/{id}/assign")))
                .json(&json!({ "userId": api::user::Id::from(user) })),
        )
        .await
    }

    pub async fn distribute(
        &self,
    ) -> Result<api::distribution::Distributed, StatusCode> {
        self.send(self.inner.post(self.url("/distribution"))).await
    }

    pub async fn workload(
        &self,
    ) -> Result<Vec<api::distribution::Workload>, StatusCode> {
        self.send(self.inner.get(self.url("/distribution/workload")))
            .await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        mut req: RequestBuilder,
    ) -> Result<T, StatusCode> {
        if let Some(token) = &self.auth_token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }
        Ok(req
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json::<T>()
            .await
            .expect("failed to get a response"))
    }
}
