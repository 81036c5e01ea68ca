//! Business logic services.
//!
//! Services contain core business logic separated from HTTP handlers.
//! They talk to storage through the store traits and to the SAT through
//! [`verifier::DocumentVerifier`].

pub mod admin_service;
pub mod batch_service;
pub mod history_service;
pub mod password;
pub mod sat_client;
pub mod verifier;
