//! Scraper for the Swedish speedway results site.
//!
//! Pages are read as a stream: only the elements a caller asks for are
//! materialized, and reading stops as soon as all of them are captured.

pub mod config;
pub mod dom;
pub mod error;
pub mod export;
pub mod models;
pub mod pipeline;
pub mod scraper;
pub mod utils;

pub use error::{Error, Result};
pub use scraper::SvemoScraper;
