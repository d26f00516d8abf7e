pub mod config;
pub mod detection;
pub mod frames;
pub mod process;
pub mod registry;
pub mod shared;
pub mod supervision;
