//! Interface adapters: CSV request intake/result output and catalog config.

pub mod config;
pub mod csv;
