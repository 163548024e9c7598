//! Type check for configuration values.
//!
//! Configuration values must stay representable as plain JSON: null, bool,
//! integer, float, string, sequences and mappings of the same. Mapping keys
//! end up as strings; integer and bool keys are converted, other keys refused.
//! Anything a caller hands to the store goes through [`to_config_value`],
//! which walks the value with a serde serializer and refuses the first part
//! that falls outside that set. The check therefore happens at write time,
//! never when the configuration is read back or saved.

use serde::Serialize;
use serde::ser::{self, Impossible};
use serde_json::{Map, Number, Value};
use std::fmt;

/// A value held by the configuration store.
pub type ConfigValue = Value;

/// Why a value was refused by the configuration type check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeError(String);

impl TypeError {
    fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for TypeError {}

impl ser::Error for TypeError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        TypeError(msg.to_string())
    }
}

impl From<TypeError> for crate::Error {
    fn from(e: TypeError) -> Self {
        crate::Error::ConfigType(e.0)
    }
}

/// Convert `value` into a configuration value, refusing anything that is not
/// recursively made of null/bool/int/float/string/sequence/mapping.
pub fn to_config_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, TypeError> {
    value.serialize(ValueSerializer)
}

struct ValueSerializer;

impl ser::Serializer for ValueSerializer {
    type Ok = Value;
    type Error = TypeError;

    type SerializeSeq = SeqBuilder;
    type SerializeTuple = SeqBuilder;
    type SerializeTupleStruct = SeqBuilder;
    type SerializeTupleVariant = VariantSeqBuilder;
    type SerializeMap = MapBuilder;
    type SerializeStruct = MapBuilder;
    type SerializeStructVariant = VariantMapBuilder;

    fn serialize_bool(self, v: bool) -> Result<Value, TypeError> {
        Ok(Value::Bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value, TypeError> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i16(self, v: i16) -> Result<Value, TypeError> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i32(self, v: i32) -> Result<Value, TypeError> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i64(self, v: i64) -> Result<Value, TypeError> {
        Ok(Value::Number(v.into()))
    }

    fn serialize_i128(self, v: i128) -> Result<Value, TypeError> {
        if let Ok(v) = i64::try_from(v) {
            return self.serialize_i64(v);
        }
        if let Ok(v) = u64::try_from(v) {
            return self.serialize_u64(v);
        }
        Err(TypeError::new(format!("integer {} is out of range", v)))
    }

    fn serialize_u8(self, v: u8) -> Result<Value, TypeError> {
        self.serialize_u64(v as u64)
    }

    fn serialize_u16(self, v: u16) -> Result<Value, TypeError> {
        self.serialize_u64(v as u64)
    }

    fn serialize_u32(self, v: u32) -> Result<Value, TypeError> {
        self.serialize_u64(v as u64)
    }

    fn serialize_u64(self, v: u64) -> Result<Value, TypeError> {
        Ok(Value::Number(v.into()))
    }

    fn serialize_u128(self, v: u128) -> Result<Value, TypeError> {
        u64::try_from(v)
            .map_err(|_| TypeError::new(format!("integer {} is out of range", v)))
            .and_then(|v| self.serialize_u64(v))
    }

    fn serialize_f32(self, v: f32) -> Result<Value, TypeError> {
        self.serialize_f64(v as f64)
    }

    fn serialize_f64(self, v: f64) -> Result<Value, TypeError> {
        Number::from_f64(v)
            .map(Value::Number)
            .ok_or_else(|| TypeError::new(format!("float {} is not finite", v)))
    }

    fn serialize_char(self, v: char) -> Result<Value, TypeError> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Value, TypeError> {
        Ok(Value::String(v.to_string()))
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<Value, TypeError> {
        Err(TypeError::new("byte strings are not allowed"))
    }

    fn serialize_none(self) -> Result<Value, TypeError> {
        Ok(Value::Null)
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Value, TypeError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value, TypeError> {
        Ok(Value::Null)
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value, TypeError> {
        Ok(Value::Null)
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<Value, TypeError> {
        Ok(Value::String(variant.to_string()))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Value, TypeError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value, TypeError> {
        let mut map = Map::new();
        map.insert(variant.to_string(), value.serialize(ValueSerializer)?);
        Ok(Value::Object(map))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqBuilder, TypeError> {
        Ok(SeqBuilder {
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqBuilder, TypeError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SeqBuilder, TypeError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<VariantSeqBuilder, TypeError> {
        Ok(VariantSeqBuilder {
            variant,
            items: Vec::with_capacity(len),
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<MapBuilder, TypeError> {
        Ok(MapBuilder {
            map: Map::new(),
            next_key: None,
        })
    }

    fn serialize_struct(self, _name: &'static str, len: usize) -> Result<MapBuilder, TypeError> {
        self.serialize_map(Some(len))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<VariantMapBuilder, TypeError> {
        Ok(VariantMapBuilder {
            variant,
            map: Map::new(),
        })
    }
}

struct SeqBuilder {
    items: Vec<Value>,
}

impl ser::SerializeSeq for SeqBuilder {
    type Ok = Value;
    type Error = TypeError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), TypeError> {
        self.items.push(value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, TypeError> {
        Ok(Value::Array(self.items))
    }
}

impl ser::SerializeTuple for SeqBuilder {
    type Ok = Value;
    type Error = TypeError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), TypeError> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value, TypeError> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SeqBuilder {
    type Ok = Value;
    type Error = TypeError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), TypeError> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value, TypeError> {
        ser::SerializeSeq::end(self)
    }
}

struct VariantSeqBuilder {
    variant: &'static str,
    items: Vec<Value>,
}

impl ser::SerializeTupleVariant for VariantSeqBuilder {
    type Ok = Value;
    type Error = TypeError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), TypeError> {
        self.items.push(value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, TypeError> {
        let mut map = Map::new();
        map.insert(self.variant.to_string(), Value::Array(self.items));
        Ok(Value::Object(map))
    }
}

struct MapBuilder {
    map: Map<String, Value>,
    next_key: Option<String>,
}

impl ser::SerializeMap for MapBuilder {
    type Ok = Value;
    type Error = TypeError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), TypeError> {
        self.next_key = Some(key.serialize(KeySerializer)?);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), TypeError> {
        let key = self
            .next_key
            .take()
            .ok_or_else(|| TypeError::new("mapping value without a key"))?;
        self.map.insert(key, value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, TypeError> {
        Ok(Value::Object(self.map))
    }
}

impl ser::SerializeStruct for MapBuilder {
    type Ok = Value;
    type Error = TypeError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), TypeError> {
        self.map
            .insert(key.to_string(), value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, TypeError> {
        Ok(Value::Object(self.map))
    }
}

struct VariantMapBuilder {
    variant: &'static str,
    map: Map<String, Value>,
}

impl ser::SerializeStructVariant for VariantMapBuilder {
    type Ok = Value;
    type Error = TypeError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), TypeError> {
        self.map
            .insert(key.to_string(), value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, TypeError> {
        let mut outer = Map::new();
        outer.insert(self.variant.to_string(), Value::Object(self.map));
        Ok(Value::Object(outer))
    }
}

/// Mapping keys. Strings pass through; integers and bools are written out
/// as strings the way JSON object keys are. Anything else is refused.
struct KeySerializer;

fn non_string_key() -> TypeError {
    TypeError::new("mapping keys must be strings, integers or bools")
}

impl ser::Serializer for KeySerializer {
    type Ok = String;
    type Error = TypeError;

    type SerializeSeq = Impossible<String, TypeError>;
    type SerializeTuple = Impossible<String, TypeError>;
    type SerializeTupleStruct = Impossible<String, TypeError>;
    type SerializeTupleVariant = Impossible<String, TypeError>;
    type SerializeMap = Impossible<String, TypeError>;
    type SerializeStruct = Impossible<String, TypeError>;
    type SerializeStructVariant = Impossible<String, TypeError>;

    fn serialize_str(self, v: &str) -> Result<String, TypeError> {
        Ok(v.to_string())
    }

    fn serialize_char(self, v: char) -> Result<String, TypeError> {
        Ok(v.to_string())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<String, TypeError> {
        Ok(variant.to_string())
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<String, TypeError> {
        value.serialize(self)
    }

    fn serialize_bool(self, v: bool) -> Result<String, TypeError> {
        Ok(v.to_string())
    }

    fn serialize_i8(self, v: i8) -> Result<String, TypeError> {
        Ok(v.to_string())
    }

    fn serialize_i16(self, v: i16) -> Result<String, TypeError> {
        Ok(v.to_string())
    }

    fn serialize_i32(self, v: i32) -> Result<String, TypeError> {
        Ok(v.to_string())
    }

    fn serialize_i64(self, v: i64) -> Result<String, TypeError> {
        Ok(v.to_string())
    }

    fn serialize_u8(self, v: u8) -> Result<String, TypeError> {
        Ok(v.to_string())
    }

    fn serialize_u16(self, v: u16) -> Result<String, TypeError> {
        Ok(v.to_string())
    }

    fn serialize_u32(self, v: u32) -> Result<String, TypeError> {
        Ok(v.to_string())
    }

    fn serialize_u64(self, v: u64) -> Result<String, TypeError> {
        Ok(v.to_string())
    }

    fn serialize_f32(self, _v: f32) -> Result<String, TypeError> {
        Err(non_string_key())
    }

    fn serialize_f64(self, _v: f64) -> Result<String, TypeError> {
        Err(non_string_key())
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<String, TypeError> {
        Err(non_string_key())
    }

    fn serialize_none(self) -> Result<String, TypeError> {
        Err(non_string_key())
    }

    fn serialize_some<T: Serialize + ?Sized>(self, _value: &T) -> Result<String, TypeError> {
        Err(non_string_key())
    }

    fn serialize_unit(self) -> Result<String, TypeError> {
        Err(non_string_key())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<String, TypeError> {
        Err(non_string_key())
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<String, TypeError> {
        Err(non_string_key())
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, TypeError> {
        Err(non_string_key())
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, TypeError> {
        Err(non_string_key())
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, TypeError> {
        Err(non_string_key())
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, TypeError> {
        Err(non_string_key())
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, TypeError> {
        Err(non_string_key())
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, TypeError> {
        Err(non_string_key())
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, TypeError> {
        Err(non_string_key())
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeMap;

    /// A value tree built from the accepted shapes, plus the shapes that
    /// must be refused wherever they appear.
    #[derive(Debug, Clone)]
    enum Tree {
        Null,
        Bool(bool),
        Int(i64),
        Float(f64),
        Str(String),
        Seq(Vec<Tree>),
        Map(BTreeMap<String, Tree>),
        IntKeyed(BTreeMap<i32, Tree>),
        Bytes(Vec<u8>),
        FloatKeyed(f64, Box<Tree>),
    }

    impl Serialize for Tree {
        fn serialize<S: ser::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
            use serde::ser::SerializeMap;
            match self {
                Tree::Null => s.serialize_unit(),
                Tree::Bool(b) => s.serialize_bool(*b),
                Tree::Int(i) => s.serialize_i64(*i),
                Tree::Float(f) => s.serialize_f64(*f),
                Tree::Str(v) => s.serialize_str(v),
                Tree::Seq(items) => items.serialize(s),
                Tree::Map(map) => map.serialize(s),
                Tree::IntKeyed(map) => map.serialize(s),
                Tree::Bytes(bytes) => s.serialize_bytes(bytes),
                Tree::FloatKeyed(key, value) => {
                    let mut map = s.serialize_map(Some(1))?;
                    map.serialize_entry(key, value)?;
                    map.end()
                }
            }
        }
    }

    fn plain() -> impl Strategy<Value = Tree> {
        let leaf = prop_oneof![
            Just(Tree::Null),
            any::<bool>().prop_map(Tree::Bool),
            any::<i64>().prop_map(Tree::Int),
            (-1.0e12f64..1.0e12).prop_map(Tree::Float),
            "[a-zA-Z0-9 ./]{0,12}".prop_map(Tree::Str),
        ];
        leaf.prop_recursive(4, 32, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Tree::Seq),
                prop::collection::btree_map("[a-z_]{1,8}", inner.clone(), 0..4)
                    .prop_map(Tree::Map),
                prop::collection::btree_map(any::<i32>(), inner, 0..4).prop_map(Tree::IntKeyed),
            ]
        })
    }

    fn refused() -> impl Strategy<Value = Tree> {
        prop_oneof![
            prop::collection::vec(any::<u8>(), 0..4).prop_map(Tree::Bytes),
            prop_oneof![Just(f64::NAN), Just(f64::INFINITY), Just(f64::NEG_INFINITY)]
                .prop_map(Tree::Float),
            (-100.0f64..100.0).prop_map(|k| Tree::FloatKeyed(k, Box::new(Tree::Null))),
        ]
    }

    /// Hide `bad` somewhere inside `host`.
    fn bury(host: Tree, bad: Tree, depth: usize) -> Tree {
        let mut tree = Tree::Seq(vec![host, bad]);
        for level in 0..depth {
            tree = if level % 2 == 0 {
                Tree::Map(BTreeMap::from([("nested".to_string(), tree)]))
            } else {
                Tree::Seq(vec![Tree::Null, tree])
            };
        }
        tree
    }

    proptest! {
        #[test]
        fn test_plain_trees_are_accepted_as_json(tree in plain()) {
            let value = to_config_value(&tree);
            prop_assert!(value.is_ok());
            prop_assert_eq!(value.unwrap(), serde_json::to_value(&tree).unwrap());
        }

        #[test]
        fn test_refused_shapes_are_refused_at_any_depth(
            host in plain(),
            bad in refused(),
            depth in 0usize..4,
        ) {
            prop_assert!(to_config_value(&bury(host, bad, depth)).is_err());
        }
    }
}
