pub mod commands;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod list;
pub mod output;
pub mod run;
