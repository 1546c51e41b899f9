#[macro_use]
pub mod debuggable;

pub mod clock;
pub mod config;
pub mod driver;
pub mod elan;
pub mod input;
pub mod service;
pub mod smbus;
