use time::OffsetDateTime;

use crate::db::{department, ticket, user, Ticket, Transaction, User};

use super::{Entity, Error};

pub(super) async fn load_ticket<T: Transaction>(
    tx: &mut T,
    id: ticket::Id,
) -> Result<Ticket, Error> {
    tx.ticket(id)
        .await?
        .ok_or(Error::NotFound(Entity::Ticket(id)))
}

pub(super) async fn load_user<T: Transaction>(
    tx: &mut T,
    id: user::Id,
) -> Result<User, Error> {
    tx.user(id).await?.ok_or(Error::NotFound(Entity::User(id)))
}

pub(super) async fn create<T: Transaction>(
    tx: &mut T,
    title: String,
    text: String,
    department: department::Id,
    creator: user::Id,
    kind: ticket::Kind,
) -> Result<ticket::Id, Error> {
    if title.trim().is_empty() {
        return Err(Error::Validation("ticket title must not be empty"));
    }
    if text.trim().is_empty() {
        return Err(Error::Validation("ticket text must not be empty"));
    }
    if tx.department(department).await?.is_none() {
        return Err(Error::Validation("ticket department does not exist"));
    }
    load_user(tx, creator).await?;

    let ticket = Ticket::new(title, text, department, creator, kind);
    tx.insert_ticket(&ticket).await?;

    tracing::info!(
        ticket_id = %ticket.id,
        user_id = %creator,
        department_id = %department,
        "ticket created",
    );
    Ok(ticket.id)
}

/// Fields a sender may overwrite with [`update`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Editable {
    pub title: bool,
    pub text: bool,
    pub department: bool,
    pub feedback: bool,
    pub kind: bool,
}

impl Editable {
    const NOTHING: Self = Self {
        title: false,
        text: false,
        department: false,
        feedback: false,
        kind: false,
    };

    fn union(self, other: Self) -> Self {
        Self {
            title: self.title || other.title,
            text: self.text || other.text,
            department: self.department || other.department,
            feedback: self.feedback || other.feedback,
            kind: self.kind || other.kind,
        }
    }

    fn is_empty(self) -> bool {
        self == Self::NOTHING
    }
}

struct Rule {
    applies: fn(&Ticket, &User) -> bool,
    grants: Editable,
}

/// Independent grants; a sender gets the union of every rule it satisfies.
const RULES: [Rule; 3] = [
    Rule {
        applies: is_creator_of_new_ticket,
        grants: Editable {
            title: true,
            text: true,
            department: true,
            ..Editable::NOTHING
        },
    },
    Rule {
        applies: is_colleague_on_closed_ticket,
        grants: Editable {
            feedback: true,
            ..Editable::NOTHING
        },
    },
    Rule {
        applies: is_admin,
        grants: Editable {
            title: true,
            text: true,
            department: true,
            feedback: true,
            kind: true,
        },
    },
];

fn is_creator_of_new_ticket(ticket: &Ticket, sender: &User) -> bool {
    ticket.creator == sender.id && ticket.status == ticket::Status::Created
}

fn is_colleague_on_closed_ticket(ticket: &Ticket, sender: &User) -> bool {
    sender.department == Some(ticket.department) && ticket.status.is_closed()
}

fn is_admin(_: &Ticket, sender: &User) -> bool {
    sender.is_admin
}

pub(super) fn editable(ticket: &Ticket, sender: &User) -> Editable {
    RULES
        .iter()
        .filter(|rule| (rule.applies)(ticket, sender))
        .fold(Editable::NOTHING, |acc, rule| acc.union(rule.grants))
}

/// Partial edit of a ticket. Absent and blank values leave the ticket as is.
#[derive(Clone, Debug, Default)]
pub struct Changes {
    pub title: Option<String>,
    pub text: Option<String>,
    pub department: Option<department::Id>,
    pub feedback: Option<String>,
    pub kind: Option<ticket::Kind>,
}

impl Changes {
    fn apply(self, ticket: &mut Ticket, editable: Editable) {
        let filled = |value: Option<String>| {
            value.filter(|v| !v.trim().is_empty())
        };

        if let Some(title) = filled(self.title).filter(|_| editable.title) {
            ticket.title = title;
        }
        if let Some(text) = filled(self.text).filter(|_| editable.text) {
            ticket.text = text;
        }
        if let Some(department) =
            self.department.filter(|_| editable.department)
        {
            ticket.department = department;
        }
        if let Some(feedback) =
            filled(self.feedback).filter(|_| editable.feedback)
        {
            ticket.feedback = Some(feedback);
        }
        if let Some(kind) = self.kind.filter(|_| editable.kind) {
            ticket.kind = kind;
        }
    }
}

pub(super) async fn update<T: Transaction>(
    tx: &mut T,
    id: ticket::Id,
    sender: user::Id,
    changes: Changes,
) -> Result<ticket::Id, Error> {
    let mut ticket = load_ticket(tx, id).await?;
    let sender = load_user(tx, sender).await?;

    if sender.department.is_none() && !sender.is_admin {
        return Err(Error::Authorization("sender belongs to no department"));
    }
    let editable = editable(&ticket, &sender);
    if editable.is_empty() {
        return Err(Error::Authorization("sender may not edit this ticket"));
    }
    if let Some(department) = changes
        .department
        .filter(|&d| editable.department && d != ticket.department)
    {
        if tx.department(department).await?.is_none() {
            return Err(Error::NotFound(Entity::Department(department)));
        }
        if let Some(assignee) = ticket.assignee {
            let assignee = load_user(tx, assignee).await?;
            if !assignee.is_admin && assignee.department != Some(department) {
                return Err(Error::Conflict(
                    "ticket assignee belongs to another department".into(),
                ));
            }
        }
    }

    let before = ticket.clone();
    changes.apply(&mut ticket, editable);
    if ticket == before {
        return Ok(id);
    }
    tx.update_ticket(&mut ticket).await?;

    tracing::info!(ticket_id = %id, user_id = %sender.id, "ticket updated");
    Ok(id)
}

pub(super) async fn delete<T: Transaction>(
    tx: &mut T,
    id: ticket::Id,
    user: user::Id,
) -> Result<ticket::Id, Error> {
    let ticket = load_ticket(tx, id).await?;
    let user = load_user(tx, user).await?;

    let allowed = user.is_admin
        || (ticket.creator == user.id
            && ticket.status == ticket::Status::Created);
    if !allowed {
        return Err(Error::Authorization("user may not delete this ticket"));
    }
    tx.delete_ticket(&ticket).await?;

    tracing::info!(ticket_id = %id, user_id = %user.id, "ticket deleted");
    Ok(id)
}

/// Admins handle tickets of any department, everybody else only those of
/// their own.
pub(super) fn ensure_may_handle(
    ticket: &Ticket,
    user: &User,
) -> Result<(), Error> {
    if user.is_admin {
        return Ok(());
    }
    match user.department {
        None => Err(Error::Authorization("user belongs to no department")),
        Some(d) if d != ticket.department => Err(Error::Authorization(
            "ticket belongs to another department",
        )),
        Some(_) => Ok(()),
    }
}

fn ensure_may_take(status: ticket::Status) -> Result<(), Error> {
    use ticket::Status as S;

    match status {
        S::Created => Ok(()),
        S::InWork => Err(Error::Conflict("ticket is already in work".into())),
        S::Completed | S::Rejected => {
            Err(Error::Conflict("ticket is already closed".into()))
        }
    }
}

fn ensure_may_close(
    status: ticket::Status,
    target: ticket::Status,
) -> Result<(), Error> {
    if status == target {
        return Err(Error::Conflict(format!(
            "ticket is already {}",
            if target == ticket::Status::Completed {
                "completed"
            } else {
                "rejected"
            },
        )));
    }
    if status.is_closed() {
        return Err(Error::Conflict("ticket is already closed".into()));
    }
    Ok(())
}

pub(super) async fn take_to_work<T: Transaction>(
    tx: &mut T,
    id: ticket::Id,
    assignee: user::Id,
) -> Result<ticket::Id, Error> {
    let mut ticket = load_ticket(tx, id).await?;
    let assignee = load_user(tx, assignee).await?;

    ensure_may_handle(&ticket, &assignee)?;
    ensure_may_take(ticket.status)?;

    ticket.status = ticket::Status::InWork;
    ticket.assignee = Some(assignee.id);
    tx.update_ticket(&mut ticket).await?;

    tracing::info!(ticket_id = %id, user_id = %assignee.id, "ticket taken");
    Ok(id)
}

/// Moves the ticket to `target`, which is either
/// [`ticket::Status::Completed`] or [`ticket::Status::Rejected`].
pub(super) async fn close<T: Transaction>(
    tx: &mut T,
    id: ticket::Id,
    assignee: user::Id,
    feedback: String,
    target: ticket::Status,
) -> Result<ticket::Id, Error> {
    if feedback.trim().is_empty() {
        return Err(Error::Validation("feedback must not be empty"));
    }
    let mut ticket = load_ticket(tx, id).await?;
    let assignee = load_user(tx, assignee).await?;

    ensure_may_handle(&ticket, &assignee)?;
    ensure_may_close(ticket.status, target)?;

    ticket.status = target;
    ticket.closed_at = Some(OffsetDateTime::now_utc());
    ticket.feedback = Some(feedback);
    ticket.assignee.get_or_insert(assignee.id);
    tx.update_ticket(&mut ticket).await?;

    tracing::info!(
        ticket_id = %id,
        user_id = %assignee.id,
        status = ?target,
        "ticket closed",
    );
    Ok(id)
}
