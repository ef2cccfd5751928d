//! Database dialect system
//!
//! Vendors are plain data records ([`DialectDescriptor`]) registered under a
//! unique key. A record may name a parent vendor; the [`DialectRegistry`]
//! merges the parent chain into a [`Dialect`] on first use.

pub mod base;
pub mod builtin;
pub mod connection;
pub mod registry;

// Re-export main types
pub use base::{
    AccessType, Dialect, DialectDescriptor, DialectError, GeometryEncoding, EMPTY_OPTION,
    PORT_NOT_APPLICABLE,
};
pub use connection::ConnectionSpec;
pub use registry::DialectRegistry;
