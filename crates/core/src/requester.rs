//! Caller identity for permission checks.

use serde::{Deserialize, Serialize};

use crate::id::UserId;

/// Role attached to a requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Field worker, may only act on their own tasks and attendance
    Worker,
    /// Administrator, may act on behalf of any worker
    Administrator,
}

/// Who is asking for an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    /// Caller identity
    pub user_id: UserId,
    /// Caller role
    pub role: Role,
}

impl Requester {
    /// A worker acting on their own behalf.
    pub fn worker(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Worker,
        }
    }

    /// An administrator.
    pub fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Administrator,
        }
    }

    /// True for administrators.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Administrator
    }

    /// True when the requester may act for `target`.
    pub fn may_act_for(&self, target: &UserId) -> bool {
        self.is_admin() || self.user_id == *target
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_acts_only_for_self() {
        let me = UserId::new();
        let someone_else = UserId::new();
        let requester = Requester::worker(me);

        assert!(requester.may_act_for(&me));
        assert!(!requester.may_act_for(&someone_else));
    }

    #[test]
    fn admin_acts_for_anyone() {
        let requester = Requester::admin(UserId::new());
        assert!(requester.may_act_for(&UserId::new()));
    }
}
