pub mod models;
pub mod schema;
mod store;

pub use models::*;
pub use store::DisplayStore;
