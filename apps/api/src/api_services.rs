//! Process bootstrap: database connection/migration and `AppState`
//! construction, split out of `main.rs` the way the teacher keeps its
//! `api_services` module.

mod database;
mod state_builder;

pub use database::connect_and_migrate;
pub use state_builder::build_app_state;
