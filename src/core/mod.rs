pub mod annotations;
pub mod assistant;
pub mod config;
pub mod downloads;
pub mod keyring;
pub mod message;
pub mod session;
pub mod tools;
