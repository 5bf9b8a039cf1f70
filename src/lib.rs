pub mod api;
pub mod app;
pub mod archive;
pub mod config;
pub mod delivery;
pub mod fetch;
pub mod humanize;
pub mod intake;
pub mod notify;
pub mod observability;
pub mod queue;
pub mod retry;
pub mod selection;
pub mod source;
pub mod worker;
