use dbdialect_rs::dialects::{
    AccessType, ConnectionSpec, DialectDescriptor, DialectError, DialectRegistry,
};
use dbdialect_rs::executor::ConnectionError;
use dbdialect_rs::probe::{ConnectionTester, Connector, ProbeFailure};
use dbdialect_rs::spatial::{
    ConnectionIdentity, Geometry, GeometryCodec, SpatialCacheRegistry, SpatialError, SridLookup,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_override_unions_reserved_words_and_keeps_parent_flags() {
    let mut registry = DialectRegistry::new();
    registry
        .register(
            DialectDescriptor::new("a")
                .with_reserved_words(["SELECT"])
                .with_port(5432)
                .with_capability("supports_batch_error_handling", true),
        )
        .unwrap();
    registry
        .register(
            DialectDescriptor::new("b")
                .with_parent("a")
                .with_reserved_words(["errors"])
                .with_capability("supports_batch_error_handling", false),
        )
        .unwrap();

    let b = registry.resolve("b").unwrap();
    assert!(b.is_reserved_word("select"));
    assert!(b.is_reserved_word("ERRORS"));
    assert_eq!(b.default_port, 5432);
    assert!(!b.capability("supports_batch_error_handling"));
    assert!(registry.resolve("a").unwrap().capability("supports_batch_error_handling"));
}

#[test]
fn test_cycle_through_registration_order_is_rejected() {
    let mut registry = DialectRegistry::new();
    registry.register(DialectDescriptor::new("x").with_parent("y")).unwrap();
    let result = registry.register(DialectDescriptor::new("y").with_parent("x"));
    assert!(matches!(result, Err(DialectError::CyclicDialectOverride(_))));
}

struct CountingLookup {
    calls: AtomicUsize,
}

impl SridLookup for CountingLookup {
    fn vendor_srid(&self, neutral: i32) -> Result<i32, SpatialError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match neutral {
            4326 => Ok(900913),
            other => Err(SpatialError::SridNotFound(other)),
        }
    }

    fn neutral_srid(&self, vendor: i32) -> Result<i32, SpatialError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match vendor {
            900913 => Ok(4326),
            other => Err(SpatialError::SridNotFound(other)),
        }
    }
}

#[test]
fn test_codec_translates_srids_once_per_identity() {
    let registry = DialectRegistry::with_builtins().unwrap();
    let dialect = registry.resolve("postgres").unwrap();
    let caches = SpatialCacheRegistry::new();
    let identity = ConnectionIdentity::new("postgresql", "gis:5432/maps");
    let lookup = Arc::new(CountingLookup { calls: AtomicUsize::new(0) });

    let codec = GeometryCodec::for_dialect(&dialect, caches.cache_for(&identity), lookup.clone()).unwrap();
    let point = Geometry::point(Some(4326), 4.35, 50.85);

    let first = codec.encode(&point).unwrap();
    let second = codec.encode(&point).unwrap();
    assert_eq!(first, second);
    assert_eq!(codec.decode(&first).unwrap(), point);
    assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);

    // Another target starts with an empty cache
    let other = ConnectionIdentity::new("postgresql", "other:5432/maps");
    assert_eq!(caches.cache_for(&other).cached_vendor_srid(4326), None);
    assert_eq!(caches.cache_for(&identity).cached_vendor_srid(4326), Some(900913));

    assert!(caches.close(&identity));
    assert_eq!(caches.cache_for(&identity).cached_vendor_srid(4326), None);
}

#[test]
fn test_dialect_without_encoding_has_no_codec() {
    let registry = DialectRegistry::with_builtins().unwrap();
    let dialect = registry.resolve("oracle").unwrap();
    let caches = SpatialCacheRegistry::new();
    let lookup = Arc::new(CountingLookup { calls: AtomicUsize::new(0) });

    let result = GeometryCodec::for_dialect(
        &dialect,
        caches.cache_for(&ConnectionIdentity::new("oracle", "ora")),
        lookup,
    );
    assert!(matches!(result, Err(SpatialError::UnsupportedGeometryEncoding { .. })));
}

struct Unreachable;

impl Connector for Unreachable {
    fn probe(&self, _: &str, _: Option<&str>, _: Option<Duration>) -> Result<(), ConnectionError> {
        Err(ConnectionError::ConnectionFailed(
            "[unixODBC] could not connect to server: No route to host".to_string(),
        ))
    }
}

#[test]
fn test_unreachable_host_yields_failed_report() {
    let registry = DialectRegistry::with_builtins().unwrap();
    let tester = ConnectionTester::new(&registry, Arc::new(Unreachable)).with_timeout(Duration::from_secs(5));

    let mut spec = ConnectionSpec::new("mysql");
    spec.name = "orders".to_string();
    spec.host = Some("10.255.255.1".to_string());
    spec.access = AccessType::Native;

    let report = tester.test(&spec).unwrap();
    assert!(!report.success());
    assert!(report.message().contains("orders"));
    assert!(matches!(report.failure_cause(), Some(ProbeFailure::Connection(_))));
    assert!(report.report_text().contains("FAILED"));
}
