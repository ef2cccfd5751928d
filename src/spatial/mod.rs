//! Spatial reference translation and geometry wire formats

pub mod cache;
pub mod codec;
pub mod lookup;

pub use cache::{ConnectionIdentity, SpatialCacheRegistry, SpatialReferenceCache};
pub use codec::{Geometry, GeometryCodec, WkbType};
pub use lookup::{QuerySource, SqlSridLookup, SridLookup};

use crate::executor::ConnectionError;

#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    #[error("SRID mapping conflict on {identity}: {detail}")]
    SpatialMappingConflict { identity: String, detail: String },

    #[error("Unsupported geometry encoding for {vendor}: {detail}")]
    UnsupportedGeometryEncoding { vendor: String, detail: String },

    #[error("No spatial reference found for SRID {0}")]
    SridNotFound(i32),

    #[error("Dialect '{0}' has no SRID lookup")]
    LookupUnavailable(String),

    #[error("SRID lookup returned '{0}', expected an integer")]
    InvalidSrid(String),

    #[error("SRID lookup failed: {0}")]
    Connection(#[from] ConnectionError),
}
