pub mod common;

use std::time::Duration;

use async_trait::async_trait;
use common::{
    Client, BOB, CAROL, DAVE, ERIN, FACILITIES, HANK, IT, SALES, SUPPORT,
};
use reqwest::StatusCode;
use ticket_desk::{
    api,
    db::{
        self, department, memory, ticket, user, Department, Memory, Store,
        Ticket, Transaction, User,
    },
};
use tokio::time;

fn assigned_to(tickets: &[Ticket], user: u128) -> usize {
    tickets
        .iter()
        .filter(|t| t.assignee == Some(user::Id::from(user)))
        .filter(|t| t.status == ticket::Status::InWork)
        .count()
}

#[tokio::test]
async fn least_loaded_member_receives_more() {
    let store = common::world().await;
    let preloaded = common::seed_ticket(
        &store,
        SUPPORT,
        ticket::Kind::Suggestion,
        Some(CAROL),
    )
    .await;
    for kind in [
        ticket::Kind::ProblemCase,
        ticket::Kind::Suggestion,
        ticket::Kind::ProblemCase,
    ] {
        common::seed_ticket(&store, SUPPORT, kind, None).await;
    }
    let url = common::serve(store.clone()).await;

    let distributed = Client::new(&url).auth(ERIN).distribute().await.unwrap();
    assert_eq!(distributed.distributed, 3);

    let tickets = common::stored_tickets(&store).await;
    assert_eq!(assigned_to(&tickets, BOB), 2);
    assert_eq!(assigned_to(&tickets, CAROL), 1);
    assert_eq!(assigned_to(&tickets, DAVE), 0);

    let preloaded = tickets.iter().find(|t| t.id == preloaded).unwrap();
    assert_eq!(preloaded.status, ticket::Status::Created);
    assert!(tickets
        .iter()
        .filter(|t| t.id != preloaded.id)
        .all(|t| t.assignee.is_some() && t.status == ticket::Status::InWork));
}

#[tokio::test]
async fn skips_regular_and_unstaffed_departments() {
    let store = common::world().await;
    let sales =
        common::seed_ticket(&store, SALES, ticket::Kind::ProblemCase, None)
            .await;
    let it = common::seed_ticket(&store, IT, ticket::Kind::ProblemCase, None)
        .await;
    let url = common::serve(store.clone()).await;

    let distributed = Client::new(&url).auth(ERIN).distribute().await.unwrap();
    assert_eq!(distributed.distributed, 0);

    for ticket in common::stored_tickets(&store).await {
        assert!(ticket.id == sales || ticket.id == it);
        assert_eq!(ticket.status, ticket::Status::Created);
        assert_eq!(ticket.assignee, None);
    }
}

#[tokio::test]
async fn second_run_has_nothing_left() {
    let store = common::world().await;
    for _ in 0..4 {
        common::seed_ticket(&store, SUPPORT, ticket::Kind::Suggestion, None)
            .await;
    }
    let url = common::serve(store).await;
    let erin = Client::new(&url).auth(ERIN);

    assert_eq!(erin.distribute().await.unwrap().distributed, 4);
    assert_eq!(erin.distribute().await.unwrap().distributed, 0);
}

#[tokio::test]
async fn distribution_requires_admin() {
    let url = common::serve(common::world().await).await;
    let bob = Client::new(&url).auth(BOB);

    assert_eq!(bob.distribute().await.unwrap_err(), StatusCode::FORBIDDEN);
    assert_eq!(bob.workload().await.unwrap_err(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn assigns_single_ticket() {
    let store = common::world().await;
    let ticket =
        common::seed_ticket(&store, SUPPORT, ticket::Kind::ProblemCase, None)
            .await;
    let url = common::serve(store).await;
    let erin = Client::new(&url).auth(ERIN);

    let assigned = erin.assign_ticket(ticket, CAROL).await.unwrap();
    assert!(assigned.assigned);

    let stored = erin.get_ticket(ticket).await.unwrap();
    assert_eq!(stored.assignee, Some(api::user::Id::from(CAROL)));
    assert_eq!(stored.status, api::ticket::Status::InWork);

    let status = erin.assign_ticket(ticket, BOB).await.unwrap_err();
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn reassigns_ticket_not_yet_in_work() {
    let store = common::world().await;
    let ticket = common::seed_ticket(
        &store,
        SUPPORT,
        ticket::Kind::ProblemCase,
        Some(CAROL),
    )
    .await;
    let url = common::serve(store).await;
    let erin = Client::new(&url).auth(ERIN);

    assert!(erin.assign_ticket(ticket, BOB).await.unwrap().assigned);
    let stored = erin.get_ticket(ticket).await.unwrap();
    assert_eq!(stored.assignee, Some(api::user::Id::from(BOB)));
}

#[tokio::test]
async fn single_assignment_checks_user() {
    let store = common::world().await;
    let support =
        common::seed_ticket(&store, SUPPORT, ticket::Kind::ProblemCase, None)
            .await;
    let sales =
        common::seed_ticket(&store, SALES, ticket::Kind::ProblemCase, None)
            .await;
    let url = common::serve(store).await;
    let erin = Client::new(&url).auth(ERIN);

    assert_eq!(
        erin.assign_ticket(support, DAVE).await.unwrap_err(),
        StatusCode::BAD_REQUEST,
    );
    assert_eq!(
        erin.assign_ticket(sales, BOB).await.unwrap_err(),
        StatusCode::FORBIDDEN,
    );
    assert_eq!(
        erin.assign_ticket(support, 999).await.unwrap_err(),
        StatusCode::NOT_FOUND,
    );
    assert_eq!(
        Client::new(&url)
            .auth(BOB)
            .assign_ticket(support, BOB)
            .await
            .unwrap_err(),
        StatusCode::FORBIDDEN,
    );
}

#[derive(Clone, Copy)]
enum Fault {
    Fail,
    Stall(Duration),
}

/// Store whose transactions misbehave on the `on_update`-th ticket update.
#[derive(Clone)]
struct Faulty {
    inner: Memory,
    on_update: usize,
    fault: Fault,
}

struct FaultyTransaction {
    inner: memory::Transaction,
    updates: usize,
    on_update: usize,
    fault: Fault,
}

#[async_trait]
impl Store for Faulty {
    type Transaction = FaultyTransaction;

    async fn begin(&self) -> Result<FaultyTransaction, db::Error> {
        Ok(FaultyTransaction {
            inner: self.inner.begin().await?,
            updates: 0,
            on_update: self.on_update,
            fault: self.fault,
        })
    }
}

#[async_trait]
impl Transaction for FaultyTransaction {
    async fn ticket(
        &mut self,
        id: ticket::Id,
    ) -> Result<Option<Ticket>, db::Error> {
        self.inner.ticket(id).await
    }

    async fn tickets(
        &mut self,
        filter: &ticket::Filter,
    ) -> Result<Vec<Ticket>, db::Error> {
        self.inner.tickets(filter).await
    }

    async fn insert_ticket(
        &mut self,
        ticket: &Ticket,
    ) -> Result<(), db::Error> {
        self.inner.insert_ticket(ticket).await
    }

    async fn update_ticket(
        &mut self,
        ticket: &mut Ticket,
    ) -> Result<(), db::Error> {
        self.updates += 1;
        if self.updates == self.on_update {
            match self.fault {
                Fault::Fail => return Err(db::Error::StaleTicket(ticket.id)),
                Fault::Stall(pause) => time::sleep(pause).await,
            }
        }
        self.inner.update_ticket(ticket).await
    }

    async fn delete_ticket(
        &mut self,
        ticket: &Ticket,
    ) -> Result<(), db::Error> {
        self.inner.delete_ticket(ticket).await
    }

    async fn user(
        &mut self,
        id: user::Id,
    ) -> Result<Option<User>, db::Error> {
        self.inner.user(id).await
    }

    async fn department(
        &mut self,
        id: department::Id,
    ) -> Result<Option<Department>, db::Error> {
        self.inner.department(id).await
    }

    async fn departments(
        &mut self,
        is_specific: bool,
    ) -> Result<Vec<Department>, db::Error> {
        self.inner.departments(is_specific).await
    }

    async fn members(
        &mut self,
        department: department::Id,
    ) -> Result<Vec<user::Member>, db::Error> {
        self.inner.members(department).await
    }

    async fn commit(self) -> Result<(), db::Error> {
        self.inner.commit().await
    }

    async fn rollback(self) -> Result<(), db::Error> {
        self.inner.rollback().await
    }
}

fn assert_untouched(tickets: &[Ticket]) {
    assert!(!tickets.is_empty());
    for ticket in tickets {
        assert_eq!(ticket.status, ticket::Status::Created);
        assert_eq!(ticket.assignee, None);
        assert_eq!(ticket.version, 0);
    }
}

#[tokio::test]
async fn failed_run_assigns_nothing() {
    let store = common::world().await;
    for _ in 0..3 {
        common::seed_ticket(&store, SUPPORT, ticket::Kind::ProblemCase, None)
            .await;
    }
    let url = common::serve(Faulty {
        inner: store.clone(),
        on_update: 2,
        fault: Fault::Fail,
    })
    .await;

    let status = Client::new(&url).auth(ERIN).distribute().await.unwrap_err();
    assert_eq!(status, StatusCode::CONFLICT);

    assert_untouched(&common::stored_tickets(&store).await);
}

#[tokio::test]
async fn failure_in_later_department_undoes_earlier_ones() {
    let store = common::world().await;
    for department in [SUPPORT, SUPPORT, FACILITIES, FACILITIES] {
        common::seed_ticket(&store, department, ticket::Kind::Suggestion, None)
            .await;
    }
    // Support is distributed first and takes the first two updates.
    let url = common::serve(Faulty {
        inner: store.clone(),
        on_update: 3,
        fault: Fault::Fail,
    })
    .await;

    let status = Client::new(&url).auth(ERIN).distribute().await.unwrap_err();
    assert_eq!(status, StatusCode::CONFLICT);

    let tickets = common::stored_tickets(&store).await;
    assert_eq!(tickets.len(), 4);
    assert_untouched(&tickets);
}

#[tokio::test]
async fn staffed_departments_are_distributed_together() {
    let store = common::world().await;
    for department in [SUPPORT, SUPPORT, FACILITIES, FACILITIES] {
        common::seed_ticket(&store, department, ticket::Kind::Suggestion, None)
            .await;
    }
    let url = common::serve(store.clone()).await;

    let distributed = Client::new(&url).auth(ERIN).distribute().await.unwrap();
    assert_eq!(distributed.distributed, 4);

    let tickets = common::stored_tickets(&store).await;
    assert_eq!(assigned_to(&tickets, BOB), 1);
    assert_eq!(assigned_to(&tickets, CAROL), 1);
    assert_eq!(assigned_to(&tickets, HANK), 2);
}

#[tokio::test]
async fn slow_run_times_out_without_committing() {
    let store = common::world().await;
    for _ in 0..3 {
        common::seed_ticket(&store, SUPPORT, ticket::Kind::ProblemCase, None)
            .await;
    }
    let service = common::service(Faulty {
        inner: store.clone(),
        on_update: 2,
        fault: Fault::Stall(Duration::from_secs(5)),
    })
    .with_timeout(Duration::from_millis(200));
    let url = common::serve_with(service).await;

    let status = Client::new(&url).auth(ERIN).distribute().await.unwrap_err();
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);

    assert_untouched(&common::stored_tickets(&store).await);
}
