pub mod config;
pub mod consult;
pub mod dispatch;
pub mod error;
pub mod output;
pub mod prompt;
