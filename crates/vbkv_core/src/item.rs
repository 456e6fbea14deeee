//! Stored document representation.
//!
//! A document is kept in its partition's collection under its key; the value
//! is a CBOR array `[cas, flags, expiration, data]`.

use crate::error::{CoreError, CoreResult};
use ciborium::value::{Integer, Value};

/// A document held by a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Document key.
    pub key: Vec<u8>,
    /// Version assigned by the last successful write.
    pub cas: u64,
    /// Opaque client flags.
    pub flags: u32,
    /// Expiration as supplied by the client.
    pub expiration: u32,
    /// Document body.
    pub data: Vec<u8>,
}

impl Item {
    /// Encodes everything but the key into collection value bytes.
    ///
    /// # Errors
    ///
    /// Returns a codec error if serialization fails.
    pub fn encode_value(&self) -> CoreResult<Vec<u8>> {
        let value = Value::Array(vec![
            Value::Integer(self.cas.into()),
            Value::Integer(self.flags.into()),
            Value::Integer(self.expiration.into()),
            Value::Bytes(self.data.clone()),
        ]);
        let mut buf = Vec::with_capacity(self.data.len() + 24);
        ciborium::into_writer(&value, &mut buf).map_err(|e| CoreError::codec(e.to_string()))?;
        Ok(buf)
    }

    /// Decodes collection value bytes stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the bytes are not a valid item record.
    pub fn decode(key: &[u8], bytes: &[u8]) -> CoreResult<Self> {
        let value: Value =
            ciborium::from_reader(bytes).map_err(|e| CoreError::codec(e.to_string()))?;
        let Value::Array(fields) = value else {
            return Err(CoreError::codec("item record is not an array"));
        };
        let [cas, flags, expiration, data]: [Value; 4] = fields
            .try_into()
            .map_err(|f: Vec<Value>| CoreError::codec(format!("item record has {} fields", f.len())))?;

        Ok(Self {
            key: key.to_vec(),
            cas: integer_field(cas, "cas")?,
            flags: integer_field(flags, "flags")?,
            expiration: integer_field(expiration, "expiration")?,
            data: match data {
                Value::Bytes(data) => data,
                _ => return Err(CoreError::codec("item data is not a byte string")),
            },
        })
    }
}

fn integer_field<T: TryFrom<Integer>>(value: Value, name: &str) -> CoreResult<T> {
    match value {
        Value::Integer(i) => {
            T::try_from(i).map_err(|_| CoreError::codec(format!("item {name} out of range")))
        }
        _ => Err(CoreError::codec(format!("item {name} is not an integer"))),
    }
}
