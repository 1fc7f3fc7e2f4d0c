// src/config/mod.rs
pub mod filter;

pub use filter::{FetchSettings, FilterConfig};
