pub mod config;
pub mod dictionary;
pub mod geometry;
pub mod model;
