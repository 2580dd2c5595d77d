pub mod analysis;
pub mod api;
pub mod cache;
pub mod commands;
pub mod error;
pub mod etl;
pub mod models;
pub mod statements;
pub mod utils;

pub use error::{DataError, DataResult};
pub use models::Config;
