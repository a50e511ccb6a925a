pub mod api;
pub mod audience;
pub mod draft;
pub mod events;
pub mod models;
pub mod stats;
