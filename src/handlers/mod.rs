//! HTTP request handlers (route handlers).
//!
//! Each handler is an async function that:
//! 1. Receives validated request data (JSON body, path, query) and the authenticated principal
//! 2. Delegates to a service
//! 3. Returns a JSON response or an `AppError`

/// Token and superadmin management endpoints
pub mod admin;
/// CFDI verification and history endpoints
pub mod cfdi;
/// Service info and health check
pub mod health;
