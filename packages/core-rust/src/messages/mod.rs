//! Wire messages for the conductor RPC protocol.
//!
//! All types use named `MsgPack` serialization (`rmp_serde::to_vec_named()`)
//! so that every argument travels under its name and the envelope stays
//! readable by peers built from other versions of this crate.

pub mod base;
pub mod call;

pub use base::{RpcOutcome, RpcReply, RpcRequest, RpcVersion, RPC_API_VERSION};
pub use call::ManagerCall;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::TransportError;

/// Encode a value as named `MsgPack`.
///
/// # Errors
///
/// Returns `TransportError::Encode` if the value cannot be serialized.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, TransportError> {
    rmp_serde::to_vec_named(value).map_err(|e| TransportError::Encode(e.to_string()))
}

/// Decode a `MsgPack` value.
///
/// # Errors
///
/// Returns `TransportError::Decode` if the bytes do not hold a `T`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, TransportError> {
    rmp_serde::from_slice(bytes).map_err(|e| TransportError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;

    use super::*;
    use crate::types::{record, Record, Value};

    /// Helper struct for integer wire format verification.
    #[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct IntegerWireTest {
        instance_id: i64,
        timeout_ms: u64,
    }

    #[test]
    fn integers_serialize_as_msgpack_integers_not_floats() {
        let bytes = encode(&IntegerWireTest {
            instance_id: -7,
            timeout_ms: 60_000,
        })
        .expect("encode");
        let value: rmpv::Value = rmpv::decode::read_value(&mut &bytes[..]).expect("raw");
        let map = value.as_map().expect("map");
        for (_, v) in map {
            assert!(v.is_i64() || v.is_u64(), "expected integer, got {v:?}");
        }
    }

    #[test]
    fn representative_payloads_roundtrip() {
        let string = Value::from("uuid-1");
        let integer = Value::Int(i64::MIN);
        let float = Value::Float(0.1 + 0.2);
        let mapping = Value::Map(record([
            ("host", Value::from("node1")),
            ("vcpus", Value::Int(4)),
            ("metadata", Value::Map(record([("ssd", Value::Bool(true))]))),
        ]));
        let rows: Vec<Record> = vec![
            record([("id", Value::Int(1)), ("device_name", Value::from("/dev/vda"))]),
            record([("id", Value::Int(2)), ("snapshot", Value::Bytes(vec![0, 255]))]),
        ];

        for value in [string, integer, float, mapping] {
            let decoded: Value = decode(&encode(&value).expect("encode")).expect("decode");
            assert_eq!(decoded, value);
        }
        let decoded: Vec<Record> = decode(&encode(&rows).expect("encode")).expect("decode");
        assert_eq!(decoded, rows);
    }

    #[test]
    fn decode_garbage_is_a_decode_error() {
        let err = decode::<RpcRequest>(&[0xC1, 0x00]).unwrap_err();
        assert!(matches!(err, TransportError::Decode(_)));
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::Int),
            any::<f64>()
                .prop_filter("NaN never equals itself", |f| !f.is_nan())
                .prop_map(Value::Float),
            "[a-z0-9-]{0,16}".prop_map(Value::String),
            proptest::collection::vec(any::<u8>(), 0..8).prop_map(Value::Bytes),
        ];
        leaf.prop_recursive(3, 32, 4, |inner| {
            prop_oneof![
                proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                proptest::collection::btree_map("[a-z_]{1,8}", inner, 0..4)
                    .prop_map(|m: BTreeMap<String, Value>| Value::Map(m)),
            ]
        })
    }

    proptest! {
        #[test]
        fn any_value_survives_msgpack(value in arb_value()) {
            let decoded: Value = decode(&encode(&value).unwrap()).unwrap();
            prop_assert_eq!(decoded, value);
        }
    }
}
