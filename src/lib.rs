mod database {
    pub mod actions;
    pub mod diff;
    pub mod error;
    pub mod form;
    pub mod pagination;
    pub mod schema;
    pub mod shopping;
    pub mod validation;
}
mod authentication {
    pub mod permissions;
    pub mod session;
}
mod cache {
    pub mod cache;

    pub use self::cache::*;
}
pub mod config;
mod constants;
pub mod dispatch;

pub use authentication::*;
pub use cache::cache::*;
pub use constants::*;
pub use database::*;
