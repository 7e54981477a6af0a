pub mod config;
pub mod errors;
pub mod export;
pub mod fonts;
pub mod routes;
pub mod state;
