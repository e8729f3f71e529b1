//! Argument fingerprinting
//!
//! Arguments are canonicalized through serde into a prefix-free, type-tagged
//! byte encoding and hashed together with the function identity:
//!
//! - sequences, tuples and struct fields keep their order
//! - map entries are sorted by their encoded key, so `HashMap` iteration
//!   order never leaks into the fingerprint
//! - integers of any width share one encoding (`7u8` and `7i64` match)
//! - `-0.0` folds into `0.0` and every NaN folds into one NaN
//!
//! Sets serialize as plain sequences, so serde gives no way to tell them from
//! a `Vec`. They are hashed in iteration order: two equal `HashSet`s can get
//! different fingerprints and miss the cache. Pass ordered sets (`BTreeSet`)
//! or sorted `Vec`s instead.
//!
//! A value whose `Serialize` impl fails (a mutably borrowed `RefCell`, a
//! poisoned `Mutex`, a non-UTF-8 path) is rejected with [`UnhashableError`].

use std::fmt;

use serde::ser::{self, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

const TAG_UNIT: u8 = 0x00;
const TAG_BOOL: u8 = 0x01;
const TAG_INT: u8 = 0x02;
const TAG_UINT_WIDE: u8 = 0x03;
const TAG_FLOAT: u8 = 0x04;
const TAG_STR: u8 = 0x05;
const TAG_BYTES: u8 = 0x06;
const TAG_NONE: u8 = 0x07;
const TAG_SOME: u8 = 0x08;
const TAG_UNIT_STRUCT: u8 = 0x09;
const TAG_UNIT_VARIANT: u8 = 0x0a;
const TAG_NEWTYPE_STRUCT: u8 = 0x0b;
const TAG_NEWTYPE_VARIANT: u8 = 0x0c;
const TAG_SEQ: u8 = 0x0d;
const TAG_TUPLE: u8 = 0x0e;
const TAG_TUPLE_STRUCT: u8 = 0x0f;
const TAG_TUPLE_VARIANT: u8 = 0x10;
const TAG_MAP: u8 = 0x11;
const TAG_STRUCT: u8 = 0x12;
const TAG_STRUCT_VARIANT: u8 = 0x13;

/// Precedes every element of a sequence or field of a struct
const MORE: u8 = 0x01;
/// Closes a sequence or struct
const END: u8 = 0x00;

/// Argument value that cannot be turned into a stable fingerprint
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Argument cannot be fingerprinted: {reason}")]
pub struct UnhashableError {
    reason: String,
}

impl UnhashableError {
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl ser::Error for UnhashableError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self {
            reason: msg.to_string(),
        }
    }
}

/// SHA-256 of a function identity and its canonicalized arguments
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering
    pub fn to_hex(&self) -> String {
        self.to_string()
    }

    /// First eight hex digits, for log lines
    pub fn short(&self) -> String {
        self.to_hex()[..8].to_string()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

/// Fingerprint `args` under the given function identity
pub fn fingerprint<A>(function: &str, args: &A) -> Result<Fingerprint, UnhashableError>
where
    A: Serialize + ?Sized,
{
    let canonical = canonicalize(args)?;

    let mut hasher = Sha256::new();
    hasher.update((function.len() as u64).to_be_bytes());
    hasher.update(function.as_bytes());
    hasher.update(&canonical);
    Ok(Fingerprint(hasher.finalize().into()))
}

/// Canonical byte encoding of `value`
pub fn canonicalize<A>(value: &A) -> Result<Vec<u8>, UnhashableError>
where
    A: Serialize + ?Sized,
{
    let mut encoder = Canonical::default();
    value.serialize(&mut encoder)?;
    Ok(encoder.out)
}

#[derive(Default)]
struct Canonical {
    out: Vec<u8>,
}

impl Canonical {
    fn tag(&mut self, tag: u8) {
        self.out.push(tag);
    }

    fn len(&mut self, len: usize) {
        self.out.extend_from_slice(&(len as u64).to_be_bytes());
    }

    fn bytes(&mut self, bytes: &[u8]) {
        self.len(bytes.len());
        self.out.extend_from_slice(bytes);
    }

    fn name(&mut self, name: &str) {
        self.bytes(name.as_bytes());
    }

    fn variant(&mut self, name: &str, index: u32, variant: &str) {
        self.name(name);
        self.out.extend_from_slice(&index.to_be_bytes());
        self.name(variant);
    }

    fn int(&mut self, v: i128) {
        self.tag(TAG_INT);
        self.out.extend_from_slice(&v.to_be_bytes());
    }

    fn float(&mut self, v: f64) {
        let bits = if v.is_nan() {
            f64::NAN.to_bits()
        } else if v == 0.0 {
            0.0f64.to_bits()
        } else {
            v.to_bits()
        };
        self.tag(TAG_FLOAT);
        self.out.extend_from_slice(&bits.to_be_bytes());
    }
}

impl<'a> ser::Serializer for &'a mut Canonical {
    type Ok = ();
    type Error = UnhashableError;

    type SerializeSeq = Sequence<'a>;
    type SerializeTuple = Sequence<'a>;
    type SerializeTupleStruct = Sequence<'a>;
    type SerializeTupleVariant = Sequence<'a>;
    type SerializeMap = Entries<'a>;
    type SerializeStruct = Sequence<'a>;
    type SerializeStructVariant = Sequence<'a>;

    fn serialize_bool(self, v: bool) -> Result<(), UnhashableError> {
        self.tag(TAG_BOOL);
        self.out.push(v as u8);
        Ok(())
    }

    fn serialize_i8(self, v: i8) -> Result<(), UnhashableError> {
        self.int(v.into());
        Ok(())
    }

    fn serialize_i16(self, v: i16) -> Result<(), UnhashableError> {
        self.int(v.into());
        Ok(())
    }

    fn serialize_i32(self, v: i32) -> Result<(), UnhashableError> {
        self.int(v.into());
        Ok(())
    }

    fn serialize_i64(self, v: i64) -> Result<(), UnhashableError> {
        self.int(v.into());
        Ok(())
    }

    fn serialize_i128(self, v: i128) -> Result<(), UnhashableError> {
        self.int(v);
        Ok(())
    }

    fn serialize_u8(self, v: u8) -> Result<(), UnhashableError> {
        self.int(v.into());
        Ok(())
    }

    fn serialize_u16(self, v: u16) -> Result<(), UnhashableError> {
        self.int(v.into());
        Ok(())
    }

    fn serialize_u32(self, v: u32) -> Result<(), UnhashableError> {
        self.int(v.into());
        Ok(())
    }

    fn serialize_u64(self, v: u64) -> Result<(), UnhashableError> {
        self.int(v.into());
        Ok(())
    }

    fn serialize_u128(self, v: u128) -> Result<(), UnhashableError> {
        match i128::try_from(v) {
            Ok(v) => self.int(v),
            Err(_) => {
                self.tag(TAG_UINT_WIDE);
                self.out.extend_from_slice(&v.to_be_bytes());
            }
        }
        Ok(())
    }

    fn serialize_f32(self, v: f32) -> Result<(), UnhashableError> {
        self.float(v.into());
        Ok(())
    }

    fn serialize_f64(self, v: f64) -> Result<(), UnhashableError> {
        self.float(v);
        Ok(())
    }

    fn serialize_char(self, v: char) -> Result<(), UnhashableError> {
        let mut buf = [0u8; 4];
        self.serialize_str(v.encode_utf8(&mut buf))
    }

    fn serialize_str(self, v: &str) -> Result<(), UnhashableError> {
        self.tag(TAG_STR);
        self.bytes(v.as_bytes());
        Ok(())
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<(), UnhashableError> {
        self.tag(TAG_BYTES);
        self.bytes(v);
        Ok(())
    }

    fn serialize_none(self) -> Result<(), UnhashableError> {
        self.tag(TAG_NONE);
        Ok(())
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<(), UnhashableError> {
        self.tag(TAG_SOME);
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<(), UnhashableError> {
        self.tag(TAG_UNIT);
        Ok(())
    }

    fn serialize_unit_struct(self, name: &'static str) -> Result<(), UnhashableError> {
        self.tag(TAG_UNIT_STRUCT);
        self.name(name);
        Ok(())
    }

    fn serialize_unit_variant(
        self,
        name: &'static str,
        variant_index: u32,
        variant: &'static str,
    ) -> Result<(), UnhashableError> {
        self.tag(TAG_UNIT_VARIANT);
        self.variant(name, variant_index, variant);
        Ok(())
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        name: &'static str,
        value: &T,
    ) -> Result<(), UnhashableError> {
        self.tag(TAG_NEWTYPE_STRUCT);
        self.name(name);
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        name: &'static str,
        variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<(), UnhashableError> {
        self.tag(TAG_NEWTYPE_VARIANT);
        self.variant(name, variant_index, variant);
        value.serialize(self)
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Sequence<'a>, UnhashableError> {
        self.tag(TAG_SEQ);
        Ok(Sequence { enc: self })
    }

    fn serialize_tuple(self, len: usize) -> Result<Sequence<'a>, UnhashableError> {
        self.tag(TAG_TUPLE);
        self.len(len);
        Ok(Sequence { enc: self })
    }

    fn serialize_tuple_struct(
        self,
        name: &'static str,
        len: usize,
    ) -> Result<Sequence<'a>, UnhashableError> {
        self.tag(TAG_TUPLE_STRUCT);
        self.name(name);
        self.len(len);
        Ok(Sequence { enc: self })
    }

    fn serialize_tuple_variant(
        self,
        name: &'static str,
        variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Sequence<'a>, UnhashableError> {
        self.tag(TAG_TUPLE_VARIANT);
        self.variant(name, variant_index, variant);
        self.len(len);
        Ok(Sequence { enc: self })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Entries<'a>, UnhashableError> {
        Ok(Entries {
            enc: self,
            entries: Vec::new(),
            pending_key: None,
        })
    }

    fn serialize_struct(
        self,
        name: &'static str,
        _len: usize,
    ) -> Result<Sequence<'a>, UnhashableError> {
        self.tag(TAG_STRUCT);
        self.name(name);
        Ok(Sequence { enc: self })
    }

    fn serialize_struct_variant(
        self,
        name: &'static str,
        variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Sequence<'a>, UnhashableError> {
        self.tag(TAG_STRUCT_VARIANT);
        self.variant(name, variant_index, variant);
        Ok(Sequence { enc: self })
    }
}

/// Ordered elements, each preceded by [`MORE`] and closed by [`END`]
struct Sequence<'a> {
    enc: &'a mut Canonical,
}

impl Sequence<'_> {
    fn element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), UnhashableError> {
        self.enc.out.push(MORE);
        value.serialize(&mut *self.enc)
    }

    fn field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), UnhashableError> {
        self.enc.out.push(MORE);
        self.enc.name(key);
        value.serialize(&mut *self.enc)
    }

    fn finish(self) -> Result<(), UnhashableError> {
        self.enc.out.push(END);
        Ok(())
    }
}

impl ser::SerializeSeq for Sequence<'_> {
    type Ok = ();
    type Error = UnhashableError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        self.element(value)
    }

    fn end(self) -> Result<(), Self::Error> {
        self.finish()
    }
}

impl ser::SerializeTuple for Sequence<'_> {
    type Ok = ();
    type Error = UnhashableError;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        self.element(value)
    }

    fn end(self) -> Result<(), Self::Error> {
        self.finish()
    }
}

impl ser::SerializeTupleStruct for Sequence<'_> {
    type Ok = ();
    type Error = UnhashableError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        self.element(value)
    }

    fn end(self) -> Result<(), Self::Error> {
        self.finish()
    }
}

impl ser::SerializeTupleVariant for Sequence<'_> {
    type Ok = ();
    type Error = UnhashableError;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        self.element(value)
    }

    fn end(self) -> Result<(), Self::Error> {
        self.finish()
    }
}

impl ser::SerializeStruct for Sequence<'_> {
    type Ok = ();
    type Error = UnhashableError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        self.field(key, value)
    }

    fn end(self) -> Result<(), Self::Error> {
        self.finish()
    }
}

impl ser::SerializeStructVariant for Sequence<'_> {
    type Ok = ();
    type Error = UnhashableError;

    fn serialize_field<T: ?Sized + Serialize>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        self.field(key, value)
    }

    fn end(self) -> Result<(), Self::Error> {
        self.finish()
    }
}

/// Map entries, buffered so they can be written in key order
struct Entries<'a> {
    enc: &'a mut Canonical,
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    pending_key: Option<Vec<u8>>,
}

impl ser::SerializeMap for Entries<'_> {
    type Ok = ();
    type Error = UnhashableError;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), Self::Error> {
        self.pending_key = Some(canonicalize(key)?);
        Ok(())
    }

    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        let key = self
            .pending_key
            .take()
            .ok_or_else(|| <UnhashableError as ser::Error>::custom("map value without a key"))?;
        self.entries.push((key, canonicalize(value)?));
        Ok(())
    }

    fn end(mut self) -> Result<(), Self::Error> {
        self.entries.sort();
        self.enc.tag(TAG_MAP);
        self.enc.len(self.entries.len());
        for (key, value) in &self.entries {
            self.enc.out.extend_from_slice(key);
            self.enc.out.extend_from_slice(value);
        }
        Ok(())
    }
}
