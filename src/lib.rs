pub mod cli;
pub mod config;
pub mod history;
pub mod import;
pub mod pipeline;
pub mod scan;
pub mod watch;
