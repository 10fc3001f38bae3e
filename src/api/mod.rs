//! Web API module for the bet list dashboard
//!
//! JSON endpoints over the query layer and a single editing session.

pub mod routes;
pub mod server;

pub use server::{create_app, AppState};
