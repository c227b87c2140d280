//! Backend for the MoneyGa marketing site: live presence, registration
//! growth, member lookups and the feedback wall, all over the managed backend.
pub mod config;
pub mod error;
pub mod feedback;
pub mod geo;
pub mod growth;
pub mod members;
pub mod models;
pub mod presence;
pub mod routes;
pub mod state;
pub mod store;
pub mod utils {
    pub mod refresh;
    pub mod throttle;
}
