pub mod book_ref;
pub mod config;
pub mod context;
pub mod logging;
