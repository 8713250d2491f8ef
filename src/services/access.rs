//! Permission decisions over the identity the gateway already authenticated.

use crate::db::types::Role;
use crate::services::errors::ExamError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Caller {
    pub(crate) account_id: i64,
    pub(crate) role: Role,
}

impl Caller {
    pub(crate) fn new(account_id: i64, role: Role) -> Self {
        Self { account_id, role }
    }
}

pub(crate) fn is_privileged(role: Role) -> bool {
    matches!(role, Role::Admin | Role::Teacher)
}

pub(crate) fn is_owner(student_id: i64, caller: &Caller) -> bool {
    student_id == caller.account_id
}

pub(crate) fn require_privileged(caller: &Caller) -> Result<(), ExamError> {
    if is_privileged(caller.role) {
        Ok(())
    } else {
        Err(ExamError::Forbidden("Teacher or admin role required"))
    }
}

/// Mutations are reserved to the student who owns the attempt, whatever their role.
pub(crate) fn require_owner(student_id: i64, caller: &Caller) -> Result<(), ExamError> {
    if is_owner(student_id, caller) {
        Ok(())
    } else {
        Err(ExamError::Forbidden("Access denied"))
    }
}

pub(crate) fn require_reader(student_id: i64, caller: &Caller) -> Result<(), ExamError> {
    if is_owner(student_id, caller) || is_privileged(caller.role) {
        Ok(())
    } else {
        Err(ExamError::Forbidden("Access denied"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_admin_and_teacher_are_privileged() {
        assert!(is_privileged(Role::Admin));
        assert!(is_privileged(Role::Teacher));
        assert!(!is_privileged(Role::Student));
        assert!(!is_privileged(Role::Unknown));
    }

    #[test]
    fn reader_rules() {
        let owner = Caller::new(7, Role::Student);
        let stranger = Caller::new(8, Role::Student);
        let teacher = Caller::new(9, Role::Teacher);
        let unknown = Caller::new(10, Role::Unknown);

        assert!(require_reader(7, &owner).is_ok());
        assert!(matches!(require_reader(7, &stranger), Err(ExamError::Forbidden(_))));
        assert!(require_reader(7, &teacher).is_ok());
        assert!(matches!(require_reader(7, &unknown), Err(ExamError::Forbidden(_))));
    }

    #[test]
    fn privileged_callers_still_cannot_mutate_foreign_attempts() {
        let admin = Caller::new(1, Role::Admin);
        assert!(matches!(require_owner(2, &admin), Err(ExamError::Forbidden(_))));
        assert!(require_owner(1, &admin).is_ok());
    }

    #[test]
    fn unknown_role_owning_an_attempt_is_still_owner() {
        let caller = Caller::new(3, Role::Unknown);
        assert!(require_owner(3, &caller).is_ok());
        assert!(require_privileged(&caller).is_err());
    }
}
