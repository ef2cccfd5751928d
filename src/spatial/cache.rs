use crate::spatial::SpatialError;
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Scope key for cached SRID mappings: one vendor talking to one target
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionIdentity {
    pub vendor: String,
    pub target: String,
}

impl ConnectionIdentity {
    pub fn new(vendor: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            vendor: vendor.into(),
            target: target.into(),
        }
    }
}

impl fmt::Display for ConnectionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.vendor, self.target)
    }
}

#[derive(Debug, Default)]
struct Mappings {
    to_vendor: HashMap<i32, i32>,
    to_neutral: HashMap<i32, i32>,
    /// Set once a conflicting lookup was seen
    conflict: Option<String>,
}

impl Mappings {
    fn check_trusted(&self, identity: &ConnectionIdentity) -> Result<(), SpatialError> {
        match &self.conflict {
            Some(detail) => Err(SpatialError::SpatialMappingConflict {
                identity: identity.to_string(),
                detail: detail.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Install `neutral <-> vendor`, keeping whatever is already bound
    fn install(&mut self, identity: &ConnectionIdentity, neutral: i32, vendor: i32) -> Result<(), SpatialError> {
        let bound_vendor = self.to_vendor.get(&neutral).copied();
        let bound_neutral = self.to_neutral.get(&vendor).copied();

        let detail = match (bound_vendor, bound_neutral) {
            (Some(v), Some(n)) if v == vendor && n == neutral => return Ok(()),
            (None, None) => {
                self.to_vendor.insert(neutral, vendor);
                self.to_neutral.insert(vendor, neutral);
                debug!("Cached SRID mapping {} <-> {} for {}", neutral, vendor, identity);
                return Ok(());
            }
            (Some(v), _) if v != vendor => format!(
                "neutral SRID {} is bound to vendor SRID {} but lookup returned {}",
                neutral, v, vendor
            ),
            (_, Some(n)) => format!(
                "vendor SRID {} is bound to neutral SRID {} but lookup paired it with {}",
                vendor, n, neutral
            ),
            (Some(v), None) => format!(
                "neutral SRID {} is bound to vendor SRID {} without a reverse entry",
                neutral, v
            ),
        };

        error!("SRID mapping conflict for {}: {}", identity, detail);
        self.to_vendor.clear();
        self.to_neutral.clear();
        self.conflict = Some(detail.clone());
        Err(SpatialError::SpatialMappingConflict {
            identity: identity.to_string(),
            detail,
        })
    }
}

/// Bidirectional neutral/vendor SRID cache for one connection identity.
///
/// Mappings are immutable once installed. A lookup that contradicts an
/// installed mapping poisons the cache: every later call fails until the
/// identity is closed and a fresh cache is created.
#[derive(Debug)]
pub struct SpatialReferenceCache {
    identity: ConnectionIdentity,
    mappings: Mutex<Mappings>,
}

impl SpatialReferenceCache {
    pub fn new(identity: ConnectionIdentity) -> Self {
        Self {
            identity,
            mappings: Mutex::new(Mappings::default()),
        }
    }

    pub fn identity(&self) -> &ConnectionIdentity {
        &self.identity
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Mappings> {
        self.mappings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Vendor SRID for `neutral`, calling `lookup` only on a miss
    pub fn to_vendor_srid<F>(&self, neutral: i32, lookup: F) -> Result<i32, SpatialError>
    where
        F: FnOnce(i32) -> Result<i32, SpatialError>,
    {
        {
            let mappings = self.lock();
            mappings.check_trusted(&self.identity)?;
            if let Some(vendor) = mappings.to_vendor.get(&neutral) {
                return Ok(*vendor);
            }
        }

        // The database round trip happens outside the lock
        debug!("SRID cache miss for neutral {} on {}", neutral, self.identity);
        let vendor = lookup(neutral)?;

        let mut mappings = self.lock();
        mappings.check_trusted(&self.identity)?;
        if let Some(existing) = mappings.to_vendor.get(&neutral).copied() {
            if existing == vendor {
                return Ok(existing);
            }
        }
        mappings.install(&self.identity, neutral, vendor)?;
        Ok(vendor)
    }

    /// Neutral SRID for `vendor`, calling `lookup` only on a miss
    pub fn to_neutral_srid<F>(&self, vendor: i32, lookup: F) -> Result<i32, SpatialError>
    where
        F: FnOnce(i32) -> Result<i32, SpatialError>,
    {
        {
            let mappings = self.lock();
            mappings.check_trusted(&self.identity)?;
            if let Some(neutral) = mappings.to_neutral.get(&vendor) {
                return Ok(*neutral);
            }
        }

        debug!("SRID cache miss for vendor {} on {}", vendor, self.identity);
        let neutral = lookup(vendor)?;

        let mut mappings = self.lock();
        mappings.check_trusted(&self.identity)?;
        if let Some(existing) = mappings.to_neutral.get(&vendor).copied() {
            if existing == neutral {
                return Ok(existing);
            }
        }
        mappings.install(&self.identity, neutral, vendor)?;
        Ok(neutral)
    }

    pub fn cached_vendor_srid(&self, neutral: i32) -> Option<i32> {
        self.lock().to_vendor.get(&neutral).copied()
    }

    pub fn len(&self) -> usize {
        self.lock().to_vendor.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_poisoned(&self) -> bool {
        self.lock().conflict.is_some()
    }
}

/// Owns one cache per connection identity
#[derive(Debug, Default)]
pub struct SpatialCacheRegistry {
    caches: Mutex<HashMap<ConnectionIdentity, Arc<SpatialReferenceCache>>>,
}

impl SpatialCacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared cache for `identity`, created on first use
    pub fn cache_for(&self, identity: &ConnectionIdentity) -> Arc<SpatialReferenceCache> {
        let mut caches = self.caches.lock().unwrap_or_else(PoisonError::into_inner);
        caches
            .entry(identity.clone())
            .or_insert_with(|| Arc::new(SpatialReferenceCache::new(identity.clone())))
            .clone()
    }

    /// Drop the identity's mappings; the next `cache_for` starts empty
    pub fn close(&self, identity: &ConnectionIdentity) -> bool {
        let removed = self
            .caches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(identity)
            .is_some();
        if removed {
            debug!("Discarded SRID cache for {}", identity);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.caches.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
