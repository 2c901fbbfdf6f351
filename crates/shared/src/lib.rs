pub mod models;
pub mod viewport;
