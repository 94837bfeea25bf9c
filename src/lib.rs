pub mod geometry;
pub mod io;
pub mod local_mapping;
pub mod system;
pub mod tracking;
