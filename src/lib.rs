#![allow(non_snake_case)]

pub mod alert;
pub mod archive;
pub mod collector;
pub mod config;
pub mod errors;
pub mod handler;
pub mod history;
pub mod lookup;
pub mod report;
pub mod store;
pub mod template;
pub mod tickets;
pub mod transcript;
