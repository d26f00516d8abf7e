pub mod file_frame_store;
