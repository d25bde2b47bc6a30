use serde::{Deserialize, Serialize};

use crate::{
    error::ServiceError,
    schema::{Id, UserRole},
};

use super::permissions::ActionType;

/// The acting user, as supplied by the identity provider.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SessionData {
    pub user_id: Id,
    pub username: String,
    pub role: UserRole,
}

impl SessionData {
    pub fn new(user_id: Id, username: &str, role: UserRole) -> Self {
        Self {
            user_id,
            username: username.to_owned(),
            role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    pub fn authenticate(&self, action: ActionType) -> Result<(), ServiceError> {
        if !action.authenticate(self) {
            return Err(ServiceError::Forbidden);
        }
        Ok(())
    }

    /// Authors may manage their own records; admins may manage everyone's.
    pub fn authenticate_owner(
        &self,
        owner_id: Id,
        own: ActionType,
        all: ActionType,
    ) -> Result<(), ServiceError> {
        self.authenticate(own)?;
        if owner_id == self.user_id || self.authenticate(all).is_ok() {
            return Ok(());
        }
        Err(ServiceError::Forbidden)
    }
}

pub fn require_session(session: Option<&SessionData>) -> Result<&SessionData, ServiceError> {
    session.ok_or(ServiceError::Unauthorized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_check() {
        let author = SessionData::new(1, "author", UserRole::User);
        let admin = SessionData::new(2, "admin", UserRole::Admin);
        let other = SessionData::new(3, "other", UserRole::User);

        for session in [&author, &admin] {
            assert!(session
                .authenticate_owner(1, ActionType::ManageOwnRecipes, ActionType::ManageAllRecipes)
                .is_ok());
        }
        assert!(matches!(
            other.authenticate_owner(1, ActionType::ManageOwnRecipes, ActionType::ManageAllRecipes),
            Err(ServiceError::Forbidden)
        ));
    }

    #[test]
    fn anonymous_is_unauthorized() {
        assert!(matches!(require_session(None), Err(ServiceError::Unauthorized)));
    }
}
