pub mod error;
pub mod fill;
pub mod playthrough;
pub mod randomize;
pub mod settings;
pub mod spoiler_log;
