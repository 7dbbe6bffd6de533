//! Payload encoding for recorded results and fingerprint inputs.
//!
//! Two tiers: a structured [`PayloadCodec`] used for everything that is
//! persisted, and [`lossy_text`], a `Debug` rendering that only ever feeds
//! fingerprints when the structured encoder rejects an argument. Distinct
//! values may share a `Debug` rendering, so a fingerprint built from lossy
//! text is only as deterministic as that rendering.
//!
//! JSON has no spelling for NaN or the infinities and writes both `None` and
//! `Some(None)` as `null`. [`JsonCodec`] refuses such values instead of
//! writing something that decodes differently.

use serde::de::DeserializeOwned;
use serde::ser::{self, Serialize, Serializer};
use std::fmt::{self, Debug};

pub trait PayloadCodec: Send + Sync {
    /// File extension for recordings, without the dot.
    fn extension(&self) -> &str;
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, String>;
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    fn extension(&self) -> &str {
        "json"
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, String> {
        value
            .serialize(JsonShapeCheck::default())
            .map_err(|e| e.to_string())?;
        serde_json::to_vec(value).map_err(|e| e.to_string())
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, String> {
        serde_json::from_slice(bytes).map_err(|e| e.to_string())
    }
}

/// Fingerprint input for one argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentBytes {
    Structured(Vec<u8>),
    /// Lossy `Debug` text; the structured encoder rejected the value.
    LossyText(String),
}

impl ArgumentBytes {
    pub fn is_lossy(&self) -> bool {
        matches!(self, Self::LossyText(_))
    }
}

pub fn encode_argument<C, T>(codec: &C, value: &T) -> ArgumentBytes
where
    C: PayloadCodec,
    T: Serialize + Debug + ?Sized,
{
    match codec.encode(value) {
        Ok(bytes) => ArgumentBytes::Structured(bytes),
        Err(_) => ArgumentBytes::LossyText(lossy_text(value)),
    }
}

pub fn lossy_text<T: Debug + ?Sized>(value: &T) -> String {
    format!("{value:?}")
}

#[derive(Debug)]
struct Unrepresentable(String);

impl fmt::Display for Unrepresentable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Unrepresentable {}

impl ser::Error for Unrepresentable {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        Self(msg.to_string())
    }
}

/// Walks a value without producing output and fails on anything JSON
/// would flatten: non-finite floats and a `Some` around a null-shaped value.
#[derive(Debug, Clone, Copy, Default)]
struct JsonShapeCheck {
    inside_some: bool,
}

impl JsonShapeCheck {
    fn null_shaped(self, what: &str) -> Result<(), Unrepresentable> {
        if self.inside_some {
            return Err(Unrepresentable(format!(
                "Some({what}) cannot be told apart from None in JSON"
            )));
        }
        Ok(())
    }

    fn float(self, value: f64) -> Result<(), Unrepresentable> {
        if value.is_finite() {
            Ok(())
        } else {
            Err(Unrepresentable(format!("{value} has no JSON representation")))
        }
    }
}

impl Serializer for JsonShapeCheck {
    type Ok = ();
    type Error = Unrepresentable;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    fn serialize_bool(self, _v: bool) -> Result<(), Unrepresentable> {
        Ok(())
    }
    fn serialize_i8(self, _v: i8) -> Result<(), Unrepresentable> {
        Ok(())
    }
    fn serialize_i16(self, _v: i16) -> Result<(), Unrepresentable> {
        Ok(())
    }
    fn serialize_i32(self, _v: i32) -> Result<(), Unrepresentable> {
        Ok(())
    }
    fn serialize_i64(self, _v: i64) -> Result<(), Unrepresentable> {
        Ok(())
    }
    fn serialize_i128(self, _v: i128) -> Result<(), Unrepresentable> {
        Ok(())
    }
    fn serialize_u8(self, _v: u8) -> Result<(), Unrepresentable> {
        Ok(())
    }
    fn serialize_u16(self, _v: u16) -> Result<(), Unrepresentable> {
        Ok(())
    }
    fn serialize_u32(self, _v: u32) -> Result<(), Unrepresentable> {
        Ok(())
    }
    fn serialize_u64(self, _v: u64) -> Result<(), Unrepresentable> {
        Ok(())
    }
    fn serialize_u128(self, _v: u128) -> Result<(), Unrepresentable> {
        Ok(())
    }
    fn serialize_f32(self, v: f32) -> Result<(), Unrepresentable> {
        self.float(f64::from(v))
    }
    fn serialize_f64(self, v: f64) -> Result<(), Unrepresentable> {
        self.float(v)
    }
    fn serialize_char(self, _v: char) -> Result<(), Unrepresentable> {
        Ok(())
    }
    fn serialize_str(self, _v: &str) -> Result<(), Unrepresentable> {
        Ok(())
    }
    fn serialize_bytes(self, _v: &[u8]) -> Result<(), Unrepresentable> {
        Ok(())
    }
    fn serialize_none(self) -> Result<(), Unrepresentable> {
        self.null_shaped("None")
    }
    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<(), Unrepresentable> {
        value.serialize(Self { inside_some: true })
    }
    fn serialize_unit(self) -> Result<(), Unrepresentable> {
        self.null_shaped("()")
    }
    fn serialize_unit_struct(self, name: &'static str) -> Result<(), Unrepresentable> {
        self.null_shaped(name)
    }
    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
    ) -> Result<(), Unrepresentable> {
        Ok(())
    }
    // Newtype structs are transparent in JSON, so `Some(Wrapper(None))` still collapses.
    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<(), Unrepresentable> {
        value.serialize(self)
    }
    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        value: &T,
    ) -> Result<(), Unrepresentable> {
        value.serialize(Self::default())
    }
    fn serialize_seq(self, _len: Option<usize>) -> Result<Self, Unrepresentable> {
        Ok(Self::default())
    }
    fn serialize_tuple(self, _len: usize) -> Result<Self, Unrepresentable> {
        Ok(Self::default())
    }
    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self, Unrepresentable> {
        Ok(Self::default())
    }
    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self, Unrepresentable> {
        Ok(Self::default())
    }
    fn serialize_map(self, _len: Option<usize>) -> Result<Self, Unrepresentable> {
        Ok(Self::default())
    }
    fn serialize_struct(self, _name: &'static str, _len: usize) -> Result<Self, Unrepresentable> {
        Ok(Self::default())
    }
    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self, Unrepresentable> {
        Ok(Self::default())
    }
}

impl ser::SerializeSeq for JsonShapeCheck {
    type Ok = ();
    type Error = Unrepresentable;
    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Unrepresentable> {
        value.serialize(Self::default())
    }
    fn end(self) -> Result<(), Unrepresentable> {
        Ok(())
    }
}

impl ser::SerializeTuple for JsonShapeCheck {
    type Ok = ();
    type Error = Unrepresentable;
    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Unrepresentable> {
        value.serialize(Self::default())
    }
    fn end(self) -> Result<(), Unrepresentable> {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for JsonShapeCheck {
    type Ok = ();
    type Error = Unrepresentable;
    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Unrepresentable> {
        value.serialize(Self::default())
    }
    fn end(self) -> Result<(), Unrepresentable> {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for JsonShapeCheck {
    type Ok = ();
    type Error = Unrepresentable;
    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Unrepresentable> {
        value.serialize(Self::default())
    }
    fn end(self) -> Result<(), Unrepresentable> {
        Ok(())
    }
}

impl ser::SerializeMap for JsonShapeCheck {
    type Ok = ();
    type Error = Unrepresentable;
    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), Unrepresentable> {
        key.serialize(Self::default())
    }
    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Unrepresentable> {
        value.serialize(Self::default())
    }
    fn end(self) -> Result<(), Unrepresentable> {
        Ok(())
    }
}

impl ser::SerializeStruct for JsonShapeCheck {
    type Ok = ();
    type Error = Unrepresentable;
    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        _key: &'static str,
        value: &T,
    ) -> Result<(), Unrepresentable> {
        value.serialize(Self::default())
    }
    fn end(self) -> Result<(), Unrepresentable> {
        Ok(())
    }
}

impl ser::SerializeStructVariant for JsonShapeCheck {
    type Ok = ();
    type Error = Unrepresentable;
    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        _key: &'static str,
        value: &T,
    ) -> Result<(), Unrepresentable> {
        value.serialize(Self::default())
    }
    fn end(self) -> Result<(), Unrepresentable> {
        Ok(())
    }
}
