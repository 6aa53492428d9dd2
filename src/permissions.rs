use crate::model::{Activity, ActivityStatus, Role, User};

/// Closed capability set. Anything not listed here cannot be asked for, which
/// makes the old default-allow fallthrough unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    SubmitActivity,
    EditActivity,
    DeleteActivity,
    ApproveActivity,
    RejectActivity,
    ViewAllActivities,
    ManageUsers,
    VerifySkill,
    SendNotification,
}

/// Pure decision function: (actor, action, optional target activity) -> allow.
/// No actor denies everything.
pub fn allows(actor: Option<&User>, action: Action, resource: Option<&Activity>) -> bool {
    let Some(actor) = actor else {
        return false;
    };
    match action {
        Action::SubmitActivity => matches!(actor.role, Role::Student | Role::Admin),
        Action::ApproveActivity
        | Action::RejectActivity
        | Action::ViewAllActivities
        | Action::VerifySkill
        | Action::SendNotification => matches!(actor.role, Role::Faculty | Role::Admin),
        Action::ManageUsers => actor.role == Role::Admin,
        Action::EditActivity | Action::DeleteActivity => match actor.role {
            Role::Admin => true,
            // Students may touch their own record only while it is pending.
            // Without the record there is nothing to prove ownership against.
            Role::Student => resource
                .map(|a| a.student_id == actor.id && a.status == ActivityStatus::Pending)
                .unwrap_or(false),
            Role::Faculty => false,
        },
    }
}
