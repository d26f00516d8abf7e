pub mod camera;
pub mod constants;
pub mod detection;
pub mod gray_frame;
