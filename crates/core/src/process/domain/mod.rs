pub mod command_spec;
pub mod process_handle;
pub mod process_launcher;
