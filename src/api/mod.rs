/// REST API types
pub mod dto;
mod error;
