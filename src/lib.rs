pub mod config;
pub mod error;
pub mod geometry;
pub mod io;
pub mod model;
pub mod persist;
pub mod system;
pub mod vision;
pub mod workers;
