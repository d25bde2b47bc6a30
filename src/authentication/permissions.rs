use crate::schema::UserRole;

use super::session::SessionData;

const ACTION_TABLE: &[(UserRole, &[ActionType])] = &[
    (
        UserRole::User,
        &[
            ActionType::CreateRecipes,
            ActionType::ManageOwnRecipes,
            ActionType::ManageOwnFavorites,
            ActionType::ManageOwnShoppingCart,
            ActionType::ManageOwnSubscriptions,
        ],
    ),
    (
        UserRole::Admin,
        &[
            ActionType::CreateRecipes,
            ActionType::ManageOwnRecipes,
            ActionType::ManageOwnFavorites,
            ActionType::ManageOwnShoppingCart,
            ActionType::ManageOwnSubscriptions,
            ActionType::ManageAllRecipes,
            ActionType::ManageCatalog,
        ],
    ),
];

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum ActionType {
    CreateRecipes,

    ManageOwnRecipes,
    ManageOwnFavorites,
    ManageOwnShoppingCart,
    ManageOwnSubscriptions,

    ManageAllRecipes,
    ManageCatalog,
}

impl ActionType {
    pub fn authenticate(self, session: &SessionData) -> bool {
        ACTION_TABLE
            .iter()
            .find(|(role, _)| *role == session.role)
            .map(|(_, actions)| actions.contains(&self))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_is_admin_only() {
        let user = SessionData::new(1, "user", UserRole::User);
        let admin = SessionData::new(2, "admin", UserRole::Admin);

        assert!(!ActionType::ManageCatalog.authenticate(&user));
        assert!(ActionType::ManageCatalog.authenticate(&admin));
        assert!(ActionType::ManageOwnFavorites.authenticate(&user));
        assert!(!ActionType::ManageAllRecipes.authenticate(&user));
    }
}
