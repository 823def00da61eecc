pub mod atlas;
pub mod config;
pub mod evaluation;
pub mod geometry;
pub mod io;
pub mod sim;
pub mod system;
pub mod viz;
