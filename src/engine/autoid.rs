//! # Auto-Id Generation
//!
//! Documents inserted without an `_id` (or with a `Null` one) get an
//! engine-assigned primary key. The generator is picked per insert batch
//! through [`AutoId`]; the default is [`AutoId::ObjectId`].

use rand::RngCore;

use crate::document::{ObjectId, Value};

/// Strategy for engine-assigned `_id` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoId {
    /// 12-byte time+machine+counter id.
    #[default]
    ObjectId,
    /// Random version-4 GUID.
    Guid,
    /// Current maximum plus one; wraps to 1 on overflow.
    Int32,
    /// Current maximum plus one; wraps to 1 on overflow.
    Int64,
}

/// Produces the next id. `last_id` is the collection's current maximum
/// `_id` (the tail of the `_id` index), consulted only by the integer
/// strategies.
pub(crate) fn generate(auto_id: AutoId, last_id: Option<&Value>) -> Value {
    match auto_id {
        AutoId::ObjectId => Value::ObjectId(ObjectId::new()),
        AutoId::Guid => Value::Guid(new_guid_v4()),
        AutoId::Int32 => match last_id {
            Some(Value::Int32(max)) => Value::Int32(max.checked_add(1).unwrap_or(1)),
            _ => Value::Int32(1),
        },
        AutoId::Int64 => match last_id {
            Some(Value::Int32(max)) => Value::Int64(*max as i64 + 1),
            Some(Value::Int64(max)) => Value::Int64(max.checked_add(1).unwrap_or(1)),
            _ => Value::Int64(1),
        },
    }
}

fn new_guid_v4() -> [u8; 16] {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes[6] = (bytes[6] & 0x0F) | 0x40;
    bytes[8] = (bytes[8] & 0x3F) | 0x80;
    bytes
}
