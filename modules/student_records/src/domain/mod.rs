pub mod clock;
pub mod error;
pub mod events;
pub mod import;
pub mod ports;
pub mod protection;
pub mod purge;
pub mod repo;
pub mod service;
pub mod validation;
