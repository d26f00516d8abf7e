pub mod model_resolver;
pub mod pico_cascade;
