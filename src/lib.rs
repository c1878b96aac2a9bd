pub mod config;
pub mod decode;
pub mod fps_counter;
pub mod logger;
