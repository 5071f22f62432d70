//! Domain layer: payment records, rail catalog, selection logic and the
//! ports implemented by the infrastructure layer.

pub mod payment;
pub mod ports;
pub mod rail;
pub mod selector;
pub mod webhook;
