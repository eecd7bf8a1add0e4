//! # Row Tuples
//!
//! Rows are serialized tuples of tagged, typed fields. A row is an
//! immutable byte-view over the KV value that stores it; field access is
//! zero-copy and keyed by `(column order, column type)`, so a row never
//! needs the table schema to be read.
//!
//! ## Layout
//!
//! ```text
//! +-------------------+
//! | count: u16 LE     |
//! +-------------------+
//! | FieldDesc[count]  |  tag: u16 (order << 5 | type), offset: u32,
//! |                   |  len: u32 (offset relative to payload start)
//! +-------------------+
//! | payload bytes     |
//! +-------------------+
//! ```
//!
//! Descriptors are sorted by tag, which makes two rows with equal field
//! sets byte-comparable and gives the tuple comparator a total order.
//!
//! ## Field payloads
//!
//! Fixed-width scalars are stored little-endian at their natural width
//! (`uint16` as 2 bytes; the key codec widens it later). Text is raw UTF-8
//! without a terminator. Fixed binaries store exactly their width; opaque
//! and nested fields store their raw bytes.

use std::cmp::Ordering;
use std::sync::Arc;

use eyre::Result;
use smallvec::SmallVec;
use zerocopy::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::errors::{fault, ErrorKind};
use crate::types::{ColType, DateTime};

const DESC_SIZE: usize = 10;
const MAX_FIELD_ORDER: u32 = (u16::MAX >> 5) as u32;

#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
#[repr(C)]
struct FieldDesc {
    tag: U16,
    offset: U32,
    len: U32,
}

fn field_tag(order: u32, ctype: ColType) -> u16 {
    debug_assert!(order <= MAX_FIELD_ORDER);
    ((order as u16) << 5) | ctype as u16
}

/// Expected payload length for a type, `None` when variable.
fn payload_width(ctype: ColType) -> Option<usize> {
    match ctype {
        ColType::Uint16 => Some(2),
        ColType::Int32 | ColType::Uint32 | ColType::Fp32 => Some(4),
        ColType::Int64 | ColType::Uint64 | ColType::Fp64 | ColType::DateTime => Some(8),
        other => other.fixed_bin_width(),
    }
}

/// Zero-copy view over one field's payload.
#[derive(Debug, Clone, Copy)]
pub struct FieldView<'a> {
    ctype: ColType,
    payload: &'a [u8],
}

impl<'a> FieldView<'a> {
    pub fn col_type(&self) -> ColType {
        self.ctype
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.payload
    }

    pub fn as_u16(&self) -> u16 {
        u16::from_le_bytes(self.payload[..2].try_into().unwrap())
    }

    pub fn as_u32(&self) -> u32 {
        u32::from_le_bytes(self.payload[..4].try_into().unwrap())
    }

    pub fn as_i32(&self) -> i32 {
        i32::from_le_bytes(self.payload[..4].try_into().unwrap())
    }

    pub fn as_u64(&self) -> u64 {
        u64::from_le_bytes(self.payload[..8].try_into().unwrap())
    }

    pub fn as_i64(&self) -> i64 {
        i64::from_le_bytes(self.payload[..8].try_into().unwrap())
    }

    pub fn as_f32(&self) -> f32 {
        f32::from_le_bytes(self.payload[..4].try_into().unwrap())
    }

    pub fn as_f64(&self) -> f64 {
        f64::from_le_bytes(self.payload[..8].try_into().unwrap())
    }

    pub fn as_datetime(&self) -> DateTime {
        DateTime(self.as_u64())
    }

    pub fn as_str(&self) -> Result<&'a str> {
        std::str::from_utf8(self.payload).map_err(|_| eyre::Report::new(ErrorKind::IndexCorrupted))
    }
}

/// Immutable zero-copy view over a serialized row.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    data: &'a [u8],
}

impl<'a> RowView<'a> {
    /// Wraps `data`, validating the header and every descriptor bound.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        if data.len() < 2 {
            return fault(ErrorKind::DataLengthMismatch);
        }
        let count = u16::from_le_bytes([data[0], data[1]]) as usize;
        let payload_start = 2 + count * DESC_SIZE;
        if data.len() < payload_start {
            return fault(ErrorKind::DataLengthMismatch);
        }
        let payload_len = data.len() - payload_start;
        let view = Self { data };
        for i in 0..count {
            let desc = view.desc(i);
            let offset = desc.offset.get() as usize;
            let len = desc.len.get() as usize;
            if offset + len > payload_len {
                return fault(ErrorKind::DataLengthMismatch);
            }
        }
        Ok(view)
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.data
    }

    pub fn field_count(&self) -> usize {
        u16::from_le_bytes([self.data[0], self.data[1]]) as usize
    }

    fn desc(&self, i: usize) -> &'a FieldDesc {
        let offset = 2 + i * DESC_SIZE;
        FieldDesc::ref_from_bytes(&self.data[offset..offset + DESC_SIZE])
            .expect("descriptor bounds were validated")
    }

    fn payload(&self, desc: &FieldDesc) -> &'a [u8] {
        let start = 2 + self.field_count() * DESC_SIZE + desc.offset.get() as usize;
        &self.data[start..start + desc.len.get() as usize]
    }

    /// Looks up the field with the given column order and type. Returns
    /// `None` when absent or when the stored payload has an impossible
    /// length for the type.
    pub fn field(&self, order: u32, ctype: ColType) -> Option<FieldView<'a>> {
        if order > MAX_FIELD_ORDER {
            return None;
        }
        let tag = field_tag(order, ctype);
        for i in 0..self.field_count() {
            let desc = self.desc(i);
            if desc.tag.get() == tag {
                let payload = self.payload(desc);
                if let Some(width) = payload_width(ctype) {
                    if payload.len() != width {
                        return None;
                    }
                }
                return Some(FieldView {
                    ctype,
                    payload,
                });
            }
        }
        None
    }
}

/// Total order over whole rows: field-by-field by tag, then payload bytes,
/// then field count.
pub fn cmp_rows(a: &RowView<'_>, b: &RowView<'_>) -> Ordering {
    let (na, nb) = (a.field_count(), b.field_count());
    for i in 0..na.min(nb) {
        let (da, db) = (a.desc(i), b.desc(i));
        match da.tag.get().cmp(&db.tag.get()) {
            Ordering::Equal => {}
            other => return other,
        }
        match a.payload(da).cmp(b.payload(db)) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    na.cmp(&nb)
}

/// Tuple comparator over raw serialized rows, suitable for installation
/// into the KV engine. Malformed inputs fall back to plain byte order so
/// the comparator stays total.
pub fn cmp_row_bytes(a: &[u8], b: &[u8]) -> Ordering {
    match (RowView::new(a), RowView::new(b)) {
        (Ok(ra), Ok(rb)) => cmp_rows(&ra, &rb),
        _ => a.cmp(b),
    }
}

/// An owned row: a refcounted buffer plus the view constructor.
#[derive(Debug, Clone)]
pub struct Row {
    bytes: Arc<[u8]>,
}

impl Row {
    pub(crate) fn from_arc(bytes: Arc<[u8]>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn view(&self) -> RowView<'_> {
        RowView::new(&self.bytes).expect("owned rows are built validated")
    }
}

/// Builder assembling a row from typed fields. Setting a field that is
/// already present replaces it, so a builder can be loaded from an existing
/// row and patched.
#[derive(Debug, Default)]
pub struct RowBuilder {
    fields: SmallVec<[(u16, Vec<u8>); 8]>,
}

impl RowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the builder with every field of an existing row.
    pub fn from_row(row: &RowView<'_>) -> Self {
        let mut fields = SmallVec::new();
        for i in 0..row.field_count() {
            let desc = row.desc(i);
            fields.push((desc.tag.get(), row.payload(desc).to_vec()));
        }
        Self { fields }
    }

    pub fn reset(&mut self) {
        self.fields.clear();
    }

    fn set(&mut self, order: u32, ctype: ColType, payload: Vec<u8>) -> Result<&mut Self> {
        if order > MAX_FIELD_ORDER {
            return fault(ErrorKind::InvalidArgument);
        }
        let tag = field_tag(order, ctype);
        if let Some(slot) = self.fields.iter_mut().find(|(t, _)| *t == tag) {
            slot.1 = payload;
        } else {
            self.fields.push((tag, payload));
        }
        Ok(self)
    }

    pub fn set_uint16(&mut self, order: u32, v: u16) -> Result<&mut Self> {
        self.set(order, ColType::Uint16, v.to_le_bytes().to_vec())
    }

    pub fn set_int32(&mut self, order: u32, v: i32) -> Result<&mut Self> {
        self.set(order, ColType::Int32, v.to_le_bytes().to_vec())
    }

    pub fn set_uint32(&mut self, order: u32, v: u32) -> Result<&mut Self> {
        self.set(order, ColType::Uint32, v.to_le_bytes().to_vec())
    }

    pub fn set_int64(&mut self, order: u32, v: i64) -> Result<&mut Self> {
        self.set(order, ColType::Int64, v.to_le_bytes().to_vec())
    }

    pub fn set_uint64(&mut self, order: u32, v: u64) -> Result<&mut Self> {
        self.set(order, ColType::Uint64, v.to_le_bytes().to_vec())
    }

    pub fn set_fp32(&mut self, order: u32, v: f32) -> Result<&mut Self> {
        self.set(order, ColType::Fp32, v.to_le_bytes().to_vec())
    }

    pub fn set_fp64(&mut self, order: u32, v: f64) -> Result<&mut Self> {
        self.set(order, ColType::Fp64, v.to_le_bytes().to_vec())
    }

    pub fn set_datetime(&mut self, order: u32, v: DateTime) -> Result<&mut Self> {
        self.set(order, ColType::DateTime, v.0.to_le_bytes().to_vec())
    }

    pub fn set_str(&mut self, order: u32, v: &str) -> Result<&mut Self> {
        self.set(order, ColType::Str, v.as_bytes().to_vec())
    }

    pub fn set_opaque(&mut self, order: u32, v: &[u8]) -> Result<&mut Self> {
        self.set(order, ColType::Opaque, v.to_vec())
    }

    /// Sets a fixed-width binary field; the payload must match the type's
    /// exact width.
    pub fn set_fixbin(&mut self, order: u32, ctype: ColType, v: &[u8]) -> Result<&mut Self> {
        match ctype.fixed_bin_width() {
            Some(width) if width == v.len() => self.set(order, ctype, v.to_vec()),
            Some(_) => fault(ErrorKind::DataLengthMismatch),
            None => fault(ErrorKind::TypeMismatch),
        }
    }

    pub fn set_nested(&mut self, order: u32, v: &RowView<'_>) -> Result<&mut Self> {
        self.set(order, ColType::Nested, v.bytes().to_vec())
    }

    /// Drops the field with the given order and type, if present.
    pub fn unset(&mut self, order: u32, ctype: ColType) -> &mut Self {
        if order <= MAX_FIELD_ORDER {
            let tag = field_tag(order, ctype);
            self.fields.retain(|(t, _)| *t != tag);
        }
        self
    }

    /// Serializes the accumulated fields into an owned row.
    pub fn build(&self) -> Row {
        let mut fields: SmallVec<[(u16, &[u8]); 8]> = self
            .fields
            .iter()
            .map(|(tag, payload)| (*tag, payload.as_slice()))
            .collect();
        fields.sort_unstable_by_key(|(tag, _)| *tag);

        let payload_len: usize = fields.iter().map(|(_, p)| p.len()).sum();
        let mut data = Vec::with_capacity(2 + fields.len() * DESC_SIZE + payload_len);
        data.extend_from_slice(&(fields.len() as u16).to_le_bytes());

        let mut offset = 0u32;
        for (tag, payload) in &fields {
            let desc = FieldDesc {
                tag: U16::new(*tag),
                offset: U32::new(offset),
                len: U32::new(payload.len() as u32),
            };
            data.extend_from_slice(desc.as_bytes());
            offset += payload.len() as u32;
        }
        for (_, payload) in &fields {
            data.extend_from_slice(payload);
        }
        Row::from_arc(Arc::from(data))
    }
}
