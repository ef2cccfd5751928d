use crate::dialects::{Dialect, GeometryEncoding};
use crate::spatial::{SpatialError, SpatialReferenceCache, SridLookup};
use log::trace;
use std::sync::Arc;

const WKB_BIG_ENDIAN: u8 = 0;
const WKB_LITTLE_ENDIAN: u8 = 1;

const EWKB_Z: u32 = 0x8000_0000;
const EWKB_M: u32 = 0x4000_0000;
const EWKB_SRID: u32 = 0x2000_0000;
const EWKB_TYPE_MASK: u32 = 0x0FFF_FFFF;

const GPKG_MAGIC: &[u8; 2] = b"GP";
const GPKG_VERSION: u8 = 0;
const GPKG_FLAG_LITTLE_ENDIAN: u8 = 0x01;
const GPKG_FLAG_EXTENDED: u8 = 0x20;

/// Vendor-neutral geometry: ISO WKB plus an optional neutral SRID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Geometry {
    pub srid: Option<i32>,
    pub wkb: Vec<u8>,
}

impl Geometry {
    pub fn new(srid: Option<i32>, wkb: Vec<u8>) -> Self {
        Self { srid, wkb }
    }

    /// 2D point in little-endian ISO WKB
    pub fn point(srid: Option<i32>, x: f64, y: f64) -> Self {
        let mut wkb = vec![WKB_LITTLE_ENDIAN];
        wkb.extend_from_slice(&1u32.to_le_bytes());
        wkb.extend_from_slice(&x.to_le_bytes());
        wkb.extend_from_slice(&y.to_le_bytes());
        Self { srid, wkb }
    }

    pub fn geometry_type(&self) -> Option<WkbType> {
        let little_endian = byte_order(self.wkb.first().copied()).ok()?;
        WkbType::from_iso(read_u32(&self.wkb, 1, little_endian)?)
    }
}

/// OGC geometry type with its dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WkbType {
    /// 1 = Point .. 7 = GeometryCollection
    pub base: u32,
    pub has_z: bool,
    pub has_m: bool,
}

impl WkbType {
    fn from_iso(code: u32) -> Option<Self> {
        let base = code % 1000;
        let (has_z, has_m) = match code / 1000 {
            0 => (false, false),
            1 => (true, false),
            2 => (false, true),
            3 => (true, true),
            _ => return None,
        };
        (1..=7).contains(&base).then_some(Self { base, has_z, has_m })
    }

    fn iso_code(&self) -> u32 {
        self.base + if self.has_z { 1000 } else { 0 } + if self.has_m { 2000 } else { 0 }
    }

    fn from_ewkb(code: u32) -> Option<Self> {
        let mut kind = Self::from_iso(code & EWKB_TYPE_MASK)?;
        kind.has_z |= code & EWKB_Z != 0;
        kind.has_m |= code & EWKB_M != 0;
        Some(kind)
    }

    fn ewkb_code(&self) -> u32 {
        self.base | if self.has_z { EWKB_Z } else { 0 } | if self.has_m { EWKB_M } else { 0 }
    }

    pub fn name(&self) -> &'static str {
        match self.base {
            1 => "POINT",
            2 => "LINESTRING",
            3 => "POLYGON",
            4 => "MULTIPOINT",
            5 => "MULTILINESTRING",
            6 => "MULTIPOLYGON",
            _ => "GEOMETRYCOLLECTION",
        }
    }
}

fn byte_order(byte: Option<u8>) -> Result<bool, String> {
    match byte {
        Some(WKB_LITTLE_ENDIAN) => Ok(true),
        Some(WKB_BIG_ENDIAN) => Ok(false),
        Some(other) => Err(format!("unknown byte order marker {:#04x}", other)),
        None => Err("empty geometry payload".to_string()),
    }
}

fn read_u32(bytes: &[u8], offset: usize, little_endian: bool) -> Option<u32> {
    let raw: [u8; 4] = bytes.get(offset..offset + 4)?.try_into().ok()?;
    Some(if little_endian { u32::from_le_bytes(raw) } else { u32::from_be_bytes(raw) })
}

fn write_u32(out: &mut Vec<u8>, value: u32, little_endian: bool) {
    if little_endian {
        out.extend_from_slice(&value.to_le_bytes());
    } else {
        out.extend_from_slice(&value.to_be_bytes());
    }
}

/// Type code convention of a WKB header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TypeCodes {
    Iso,
    Ewkb,
}

impl TypeCodes {
    fn read(self, code: u32) -> Option<WkbType> {
        match self {
            TypeCodes::Iso => WkbType::from_iso(code),
            TypeCodes::Ewkb => WkbType::from_ewkb(code),
        }
    }

    fn write(self, kind: WkbType) -> u32 {
        match self {
            TypeCodes::Iso => kind.iso_code(),
            TypeCodes::Ewkb => kind.ewkb_code(),
        }
    }
}

const MAX_NESTING: usize = 32;

/// Result of rewriting a geometry tree into another type code convention
struct Transcoded {
    wkb: Vec<u8>,
    srid: Option<i32>,
    has_z_or_m: bool,
}

/// Walks a WKB tree and copies it, rewriting the header of every nested member
struct Transcoder<'a> {
    bytes: &'a [u8],
    pos: usize,
    from: TypeCodes,
    to: TypeCodes,
    srid: Option<i32>,
    out: Vec<u8>,
    has_z_or_m: bool,
}

impl<'a> Transcoder<'a> {
    fn run(bytes: &'a [u8], from: TypeCodes, to: TypeCodes, srid: Option<i32>) -> Result<Transcoded, String> {
        let mut transcoder = Self {
            bytes,
            pos: 0,
            from,
            to,
            srid,
            out: Vec::with_capacity(bytes.len() + 4),
            has_z_or_m: false,
        };
        transcoder.geometry(0)?;
        if transcoder.pos != bytes.len() {
            return Err(format!(
                "{} trailing bytes after WKB geometry",
                bytes.len() - transcoder.pos
            ));
        }
        Ok(Transcoded {
            wkb: transcoder.out,
            srid: transcoder.srid,
            has_z_or_m: transcoder.has_z_or_m,
        })
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], String> {
        let bytes = self.bytes;
        let end = self.pos.checked_add(len).ok_or("WKB length overflow")?;
        let slice = bytes
            .get(self.pos..end)
            .ok_or_else(|| format!("WKB truncated at byte {}", self.pos))?;
        self.pos = end;
        Ok(slice)
    }

    fn copy(&mut self, len: usize) -> Result<(), String> {
        let slice = self.take(len)?;
        self.out.extend_from_slice(slice);
        Ok(())
    }

    fn count(&mut self, little_endian: bool) -> Result<usize, String> {
        let value = read_u32(self.bytes, self.pos, little_endian)
            .ok_or_else(|| format!("WKB truncated at byte {}", self.pos))?;
        self.copy(4)?;
        Ok(value as usize)
    }

    fn coordinates(&mut self, points: usize, stride: usize) -> Result<(), String> {
        let len = points.checked_mul(stride).ok_or("WKB length overflow")?;
        self.copy(len)
    }

    fn geometry(&mut self, depth: usize) -> Result<(), String> {
        if depth > MAX_NESTING {
            return Err(format!("geometry nested deeper than {} levels", MAX_NESTING));
        }
        let little_endian = byte_order(self.bytes.get(self.pos).copied())?;
        self.copy(1)?;

        let code = read_u32(self.bytes, self.pos, little_endian).ok_or("WKB shorter than its header")?;
        self.take(4)?;
        let kind = self.from.read(code).ok_or_else(|| match self.from {
            TypeCodes::Iso => format!("unknown WKB type code {}", code),
            TypeCodes::Ewkb => format!("unknown EWKB type code {:#010x}", code),
        })?;

        if self.from == TypeCodes::Ewkb && code & EWKB_SRID != 0 {
            let srid = read_u32(self.bytes, self.pos, little_endian).ok_or("EWKB SRID flag set but SRID missing")?;
            self.take(4)?;
            // Members inherit the outer SRID
            if depth == 0 {
                self.srid = Some(srid as i32);
            }
        }

        let outer_srid = if depth == 0 && self.to == TypeCodes::Ewkb { self.srid } else { None };
        let mut out_code = self.to.write(kind);
        if outer_srid.is_some() {
            out_code |= EWKB_SRID;
        }
        write_u32(&mut self.out, out_code, little_endian);
        if let Some(srid) = outer_srid {
            write_u32(&mut self.out, srid as u32, little_endian);
        }

        self.has_z_or_m |= kind.has_z || kind.has_m;
        let stride = 8 * (2 + usize::from(kind.has_z) + usize::from(kind.has_m));
        match kind.base {
            1 => self.coordinates(1, stride),
            2 => {
                let points = self.count(little_endian)?;
                self.coordinates(points, stride)
            }
            3 => {
                let rings = self.count(little_endian)?;
                for _ in 0..rings {
                    let points = self.count(little_endian)?;
                    self.coordinates(points, stride)?;
                }
                Ok(())
            }
            _ => {
                let members = self.count(little_endian)?;
                for _ in 0..members {
                    self.geometry(depth + 1)?;
                }
                Ok(())
            }
        }
    }
}

/// Vendor payload split into its SRID and an ISO WKB body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorPayload {
    pub vendor_srid: Option<i32>,
    pub wkb: Vec<u8>,
}

/// Unwrap a vendor wire value
pub fn read_vendor(encoding: GeometryEncoding, bytes: &[u8]) -> Result<VendorPayload, String> {
    match encoding {
        GeometryEncoding::Ewkb => read_ewkb(bytes),
        GeometryEncoding::Mysql => read_mysql(bytes),
        GeometryEncoding::Gpkg => read_gpkg(bytes),
    }
}

/// Wrap ISO WKB into a vendor wire value
pub fn write_vendor(encoding: GeometryEncoding, payload: &VendorPayload) -> Result<Vec<u8>, String> {
    match encoding {
        GeometryEncoding::Ewkb => write_ewkb(payload),
        GeometryEncoding::Mysql => write_mysql(payload),
        GeometryEncoding::Gpkg => write_gpkg(payload),
    }
}

fn read_ewkb(bytes: &[u8]) -> Result<VendorPayload, String> {
    let transcoded = Transcoder::run(bytes, TypeCodes::Ewkb, TypeCodes::Iso, None)?;
    Ok(VendorPayload {
        vendor_srid: transcoded.srid,
        wkb: transcoded.wkb,
    })
}

fn write_ewkb(payload: &VendorPayload) -> Result<Vec<u8>, String> {
    Transcoder::run(&payload.wkb, TypeCodes::Iso, TypeCodes::Ewkb, payload.vendor_srid)
        .map(|transcoded| transcoded.wkb)
}

/// Validate an ISO WKB tree and report whether any member carries Z or M
fn check_iso(wkb: &[u8]) -> Result<bool, String> {
    Transcoder::run(wkb, TypeCodes::Iso, TypeCodes::Iso, None).map(|transcoded| transcoded.has_z_or_m)
}

fn read_mysql(bytes: &[u8]) -> Result<VendorPayload, String> {
    let srid = read_u32(bytes, 0, true).ok_or("MySQL geometry shorter than its SRID prefix")? as i32;
    let wkb = bytes[4..].to_vec();
    if check_iso(&wkb)? {
        return Err("MySQL geometries are 2D, got Z/M coordinates".to_string());
    }
    Ok(VendorPayload {
        vendor_srid: (srid != 0).then_some(srid),
        wkb,
    })
}

fn write_mysql(payload: &VendorPayload) -> Result<Vec<u8>, String> {
    if check_iso(&payload.wkb)? {
        return Err("MySQL cannot store Z/M coordinates".to_string());
    }
    let mut out = Vec::with_capacity(payload.wkb.len() + 4);
    out.extend_from_slice(&payload.vendor_srid.unwrap_or(0).to_le_bytes());
    out.extend_from_slice(&payload.wkb);
    Ok(out)
}

fn gpkg_envelope_len(indicator: u8) -> Option<usize> {
    match indicator {
        0 => Some(0),
        1 => Some(32),
        2 | 3 => Some(48),
        4 => Some(64),
        _ => None,
    }
}

fn read_gpkg(bytes: &[u8]) -> Result<VendorPayload, String> {
    if bytes.get(0..2) != Some(GPKG_MAGIC.as_slice()) {
        return Err("missing GeoPackage magic 'GP'".to_string());
    }
    let version = bytes.get(2).copied().ok_or("GeoPackage header truncated")?;
    if version != GPKG_VERSION {
        return Err(format!("unsupported GeoPackage binary version {}", version));
    }
    let flags = bytes.get(3).copied().ok_or("GeoPackage header truncated")?;
    if flags & GPKG_FLAG_EXTENDED != 0 {
        return Err("extended GeoPackage geometry types are not supported".to_string());
    }
    let envelope = gpkg_envelope_len((flags >> 1) & 0x07)
        .ok_or_else(|| format!("invalid GeoPackage envelope indicator in flags {:#04x}", flags))?;

    let srs_id = read_u32(bytes, 4, flags & GPKG_FLAG_LITTLE_ENDIAN != 0)
        .ok_or("GeoPackage header truncated")? as i32;
    let wkb = bytes
        .get(8 + envelope..)
        .ok_or("GeoPackage envelope truncated")?
        .to_vec();
    check_iso(&wkb)?;

    // 0 and -1 are the undefined geographic/cartesian systems
    Ok(VendorPayload {
        vendor_srid: (srs_id > 0).then_some(srs_id),
        wkb,
    })
}

fn write_gpkg(payload: &VendorPayload) -> Result<Vec<u8>, String> {
    check_iso(&payload.wkb)?;
    let mut out = Vec::with_capacity(payload.wkb.len() + 8);
    out.extend_from_slice(GPKG_MAGIC);
    out.push(GPKG_VERSION);
    out.push(GPKG_FLAG_LITTLE_ENDIAN);
    out.extend_from_slice(&payload.vendor_srid.unwrap_or(0).to_le_bytes());
    out.extend_from_slice(&payload.wkb);
    Ok(out)
}

/// Converts geometry values between the neutral form and one vendor's wire form
pub struct GeometryCodec {
    vendor: String,
    encoding: GeometryEncoding,
    cache: Arc<SpatialReferenceCache>,
    lookup: Arc<dyn SridLookup>,
}

impl GeometryCodec {
    pub fn new(
        vendor: impl Into<String>,
        encoding: GeometryEncoding,
        cache: Arc<SpatialReferenceCache>,
        lookup: Arc<dyn SridLookup>,
    ) -> Self {
        Self {
            vendor: vendor.into(),
            encoding,
            cache,
            lookup,
        }
    }

    /// Codec for a dialect; fails when the vendor declares no geometry encoding
    pub fn for_dialect(
        dialect: &Dialect,
        cache: Arc<SpatialReferenceCache>,
        lookup: Arc<dyn SridLookup>,
    ) -> Result<Self, SpatialError> {
        let encoding = dialect.spatial.geometry_encoding.ok_or_else(|| {
            SpatialError::UnsupportedGeometryEncoding {
                vendor: dialect.vendor_key.clone(),
                detail: "dialect declares no geometry encoding".to_string(),
            }
        })?;
        Ok(Self::new(dialect.vendor_key.clone(), encoding, cache, lookup))
    }

    pub fn encoding(&self) -> GeometryEncoding {
        self.encoding
    }

    fn unsupported(&self, detail: String) -> SpatialError {
        SpatialError::UnsupportedGeometryEncoding {
            vendor: self.vendor.clone(),
            detail,
        }
    }

    /// Vendor wire value -> neutral geometry
    pub fn decode(&self, bytes: &[u8]) -> Result<Geometry, SpatialError> {
        let payload = read_vendor(self.encoding, bytes).map_err(|detail| self.unsupported(detail))?;
        let srid = match payload.vendor_srid {
            Some(vendor) => Some(
                self.cache
                    .to_neutral_srid(vendor, |v| self.lookup.neutral_srid(v))?,
            ),
            None => None,
        };
        trace!("Decoded {} byte {:?} geometry with SRID {:?}", bytes.len(), self.encoding, srid);
        Ok(Geometry::new(srid, payload.wkb))
    }

    /// Neutral geometry -> vendor wire value
    pub fn encode(&self, geometry: &Geometry) -> Result<Vec<u8>, SpatialError> {
        let vendor_srid = match geometry.srid {
            Some(neutral) => Some(
                self.cache
                    .to_vendor_srid(neutral, |n| self.lookup.vendor_srid(n))?,
            ),
            None => None,
        };
        let payload = VendorPayload {
            vendor_srid,
            wkb: geometry.wkb.clone(),
        };
        write_vendor(self.encoding, &payload).map_err(|detail| self.unsupported(detail))
    }
}
