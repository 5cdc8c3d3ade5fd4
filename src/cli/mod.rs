pub mod backlog;
pub mod config;
pub mod run;
