use uuid::Uuid;

use crate::error::AppError;
use crate::users::repo::{Role, User};

/// Owner reference as stored on a resource: either the bare id column or an
/// already-loaded user row. Both normalize to the same id, so the decision
/// is identical regardless of which form the caller holds.
#[derive(Debug, Clone, Copy)]
pub enum OwnerRef<'a> {
    Id(Uuid),
    User(&'a User),
}

impl OwnerRef<'_> {
    fn id(&self) -> Uuid {
        match self {
            OwnerRef::Id(id) => *id,
            OwnerRef::User(u) => u.id,
        }
    }
}

impl<'a> From<Uuid> for OwnerRef<'a> {
    fn from(id: Uuid) -> Self {
        OwnerRef::Id(id)
    }
}

impl<'a> From<&'a User> for OwnerRef<'a> {
    fn from(user: &'a User) -> Self {
        OwnerRef::User(user)
    }
}

/// Owner or admin may mutate; everyone else may not. Pure decision, no I/O.
pub fn can_mutate<'a>(owner: impl Into<OwnerRef<'a>>, user: &User) -> bool {
    owner.into().id() == user.id || user.role == Role::Admin
}

/// Role gate for routes that run after the session resolver. Order matters
/// only in that the acting user must already be resolved.
pub fn restrict_to(user: &User, allowed: &[Role]) -> Result<(), AppError> {
    if allowed.contains(&user.role) {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::repo::test_user;

    #[test]
    fn owner_can_mutate_own_resource() {
        let owner = test_user(Role::User);
        assert!(can_mutate(owner.id, &owner));
        assert!(can_mutate(&owner, &owner));
    }

    #[test]
    fn non_owner_cannot_mutate() {
        let owner = test_user(Role::User);
        let other = test_user(Role::User);
        assert!(!can_mutate(owner.id, &other));
        assert!(!can_mutate(&owner, &other));
    }

    #[test]
    fn admin_can_mutate_anything() {
        let owner = test_user(Role::User);
        let admin = test_user(Role::Admin);
        assert!(can_mutate(owner.id, &admin));
        assert!(can_mutate(&owner, &admin));
    }

    #[test]
    fn both_owner_forms_agree() {
        let owner = test_user(Role::User);
        let other = test_user(Role::User);
        let admin = test_user(Role::Admin);
        for actor in [&owner, &other, &admin] {
            assert_eq!(can_mutate(owner.id, actor), can_mutate(&owner, actor));
        }
    }

    #[test]
    fn restrict_to_rejects_missing_role() {
        let user = test_user(Role::User);
        let admin = test_user(Role::Admin);
        assert!(restrict_to(&admin, &[Role::Admin]).is_ok());
        assert!(matches!(
            restrict_to(&user, &[Role::Admin]),
            Err(AppError::Forbidden)
        ));
        assert!(restrict_to(&user, &[Role::User, Role::Admin]).is_ok());
    }
}
