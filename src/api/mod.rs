//! API Module
//!
//! HTTP handlers and routing for the cache REST API.
//!
//! # Endpoints
//! - `PUT /entries` - Store a JSON value
//! - `DELETE /entries` - Clear the cache
//! - `GET /entries/:key` - Retrieve a value by key
//! - `PATCH /entries/:key` - Merge an object into a stored object
//! - `DELETE /entries/:key` - Delete a key
//! - `POST /invalidate` - Delete every entry carrying any of the given tags
//! - `GET /stats` - Get cache statistics
//! - `POST /stats/reset` - Zero the statistics counters
//! - `POST /cleanup` - Run a TTL sweep now
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
