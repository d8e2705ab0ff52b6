use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, RequestPartsExt as _, Router,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::{
    api,
    db::{ticket, Store},
    service::{self, Changes, Service},
};

pub fn router<S: Store>(service: Service<S>, jwt_secret: &[u8]) -> Router {
    Router::new()
        .route("/ticket", get(list_tickets::<S>).post(add_ticket::<S>))
        .route(
            "/ticket/:id",
            get(get_ticket::<S>)
                .patch(edit_ticket::<S>)
                .delete(delete_ticket::<S>),
        )
        .route("/ticket/:id/take", post(take_ticket::<S>))
        .route("/ticket/:id/complete", post(complete_ticket::<S>))
        .route("/ticket/:id/reject", post(reject_ticket::<S>))
        .route("/ticket/:id/assign", post(assign_ticket::<S>))
        .route("/distribution", post(distribute::<S>))
        .route("/distribution/workload", get(workload::<S>))
        .with_state(Arc::new(AppState {
            service,
            jwt_decoding_key: DecodingKey::from_secret(jwt_secret),
        }))
}

impl IntoResponse for service::Error {
    fn into_response(self) -> Response {
        use service::Error as E;

        let status = match &self {
            E::NotFound(_) => StatusCode::NOT_FOUND,
            E::Validation(_) => StatusCode::BAD_REQUEST,
            E::Authorization(_) => StatusCode::FORBIDDEN,
            E::Conflict(_) => StatusCode::CONFLICT,
            E::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
            E::TimedOut => StatusCode::GATEWAY_TIMEOUT,
        };
        let error = match self {
            E::Persistence(_) => "internal error".to_owned(),
            e => e.to_string(),
        };
        (status, Json(api::Error { error })).into_response()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListTicketsInput {
    #[serde(default)]
    offset: usize,
    limit: Option<usize>,
    department_id: Option<api::department::Id>,
    creator_id: Option<api::user::Id>,
    assignee_id: Option<api::user::Id>,
    status: Option<api::ticket::Status>,
    #[serde(default)]
    unassigned: bool,
}

async fn list_tickets<S: Store>(
    State(state): State<SharedAppState<S>>,
    _: AuthClaims,
    Query(input): Query<ListTicketsInput>,
) -> Result<Json<api::ticket::List>, service::Error> {
    let tickets = state
        .service
        .tickets(ticket::Filter {
            department: input.department_id,
            creator: input.creator_id,
            assignee: input.assignee_id,
            status: input.status,
            unassigned_only: input.unassigned,
            offset: input.offset,
            limit: input.limit,
        })
        .await?;

    Ok(Json(api::ticket::List {
        tickets: tickets.into_iter().map(api::Ticket::from).collect(),
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddTicketInput {
    title: String,
    text: String,
    department_id: api::department::Id,
    #[serde(rename = "type")]
    kind: api::ticket::Kind,
}

async fn add_ticket<S: Store>(
    State(state): State<SharedAppState<S>>,
    auth_claims: AuthClaims,
    Json(AddTicketInput {
        title,
        text,
        department_id,
        kind,
    }): Json<AddTicketInput>,
) -> Result<Json<api::Ticket>, service::Error> {
    let id = state
        .service
        .create_ticket(title, text, department_id, auth_claims.user_id, kind)
        .await?;
    ticket_response(&state, id).await
}

async fn get_ticket<S: Store>(
    State(state): State<SharedAppState<S>>,
    _: AuthClaims,
    Path(id): Path<api::ticket::Id>,
) -> Result<Json<api::Ticket>, service::Error> {
    ticket_response(&state, id).await
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EditTicketInput {
    title: Option<String>,
    text: Option<String>,
    department_id: Option<api::department::Id>,
    feedback: Option<String>,
    #[serde(rename = "type")]
    kind: Option<api::ticket::Kind>,
}

async fn edit_ticket<S: Store>(
    State(state): State<SharedAppState<S>>,
    auth_claims: AuthClaims,
    Path(id): Path<api::ticket::Id>,
    Json(input): Json<EditTicketInput>,
) -> Result<Json<api::Ticket>, service::Error> {
    let changes = Changes {
        title: input.title,
        text: input.text,
        department: input.department_id,
        feedback: input.feedback,
        kind: input.kind,
    };
    let id = state
        .service
        .update_ticket(id, auth_claims.user_id, changes)
        .await?;
    ticket_response(&state, id).await
}

async fn delete_ticket<S: Store>(
    State(state): State<SharedAppState<S>>,
    auth_claims: AuthClaims,
    Path(id): Path<api::ticket::Id>,
) -> Result<Json<api::ticket::Deleted>, service::Error> {
    let id = state.service.delete_ticket(id, auth_claims.user_id).await?;
    Ok(Json(api::ticket::Deleted { id }))
}

async fn take_ticket<S: Store>(
    State(state): State<SharedAppState<S>>,
    auth_claims: AuthClaims,
    Path(id): Path<api::ticket::Id>,
) -> Result<Json<api::Ticket>, service::Error> {
    let id = state.service.take_to_work(id, auth_claims.user_id).await?;
    ticket_response(&state, id).await
}

#[derive(Deserialize)]
struct FeedbackInput {
    feedback: String,
}

async fn complete_ticket<S: Store>(
    State(state): State<SharedAppState<S>>,
    auth_claims: AuthClaims,
    Path(id): Path<api::ticket::Id>,
    Json(FeedbackInput { feedback }): Json<FeedbackInput>,
) -> Result<Json<api::Ticket>, service::Error> {
    let id = state
        .service
        .complete_ticket(id, auth_claims.user_id, feedback)
        .await?;
    ticket_response(&state, id).await
}

async fn reject_ticket<S: Store>(
    State(state): State<SharedAppState<S>>,
    auth_claims: AuthClaims,
    Path(id): Path<api::ticket::Id>,
    Json(FeedbackInput { feedback }): Json<FeedbackInput>,
) -> Result<Json<api::Ticket>, service::Error> {
    let id = state
        .service
        .reject_ticket(id, auth_claims.user_id, feedback)
        .await?;
    ticket_response(&state, id).await
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssignTicketInput {
    user_id: api::user::Id,
}

async fn assign_ticket<S: Store>(
    State(state): State<SharedAppState<S>>,
    auth_claims: AuthClaims,
    Path(id): Path<api::ticket::Id>,
    Json(AssignTicketInput { user_id }): Json<AssignTicketInput>,
) -> Result<Json<api::distribution::Assigned>, service::Error> {
    require_admin(&state, auth_claims).await?;

    let assigned = state.service.distribute_one(user_id, id).await?;
    Ok(Json(api::distribution::Assigned { assigned }))
}

async fn distribute<S: Store>(
    State(state): State<SharedAppState<S>>,
    auth_claims: AuthClaims,
) -> Result<Json<api::distribution::Distributed>, service::Error> {
    require_admin(&state, auth_claims).await?;

    let distributed = state.service.distribute_all().await?;
    Ok(Json(api::distribution::Distributed { distributed }))
}

async fn workload<S: Store>(
    State(state): State<SharedAppState<S>>,
    auth_claims: AuthClaims,
) -> Result<Json<Vec<api::distribution::Workload>>, service::Error> {
    require_admin(&state, auth_claims).await?;

    let report = state.service.workload().await?;
    Ok(Json(report.into_iter().map(Into::into).collect()))
}

async fn ticket_response<S: Store>(
    state: &AppState<S>,
    id: api::ticket::Id,
) -> Result<Json<api::Ticket>, service::Error> {
    Ok(Json(state.service.ticket(id).await?.into()))
}

async fn require_admin<S: Store>(
    state: &AppState<S>,
    auth_claims: AuthClaims,
) -> Result<(), service::Error> {
    let me = state.service.user(auth_claims.user_id).await?;
    if !me.is_admin {
        return Err(service::Error::Authorization("admin rights required"));
    }
    Ok(())
}

type SharedAppState<S> = Arc<AppState<S>>;

struct AppState<S> {
    service: Service<S>,

    jwt_decoding_key: DecodingKey,
}

/// Claims of the bearer token every request carries.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct AuthClaims {
    pub user_id: api::user::Id,
    pub exp: i64,
}

#[derive(Debug)]
pub enum AuthError {
    InvalidToken,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::InvalidToken => StatusCode::UNAUTHORIZED,
        }
        .into_response()
    }
}

#[async_trait]
impl<S: Store> FromRequestParts<SharedAppState<S>> for AuthClaims {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut request::Parts,
        state: &SharedAppState<S>,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AuthError::InvalidToken)?;
        let token_data = decode::<Self>(
            bearer.token(),
            &state.jwt_decoding_key,
            &Validation::default(),
        )
        .map_err(|_| AuthError::InvalidToken)?;

        Ok(token_data.claims)
    }
}
