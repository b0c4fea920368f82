//! # Document Model
//!
//! The tagged value tree kitedb persists, with its binary codec and the
//! ordered comparison every index relies on.
//!
//! ## Value Kinds
//!
//! | Kind | Rust payload | Notes |
//! |------|--------------|-------|
//! | MinKey | - | below every value; HEAD sentinel key |
//! | Null | - | also the key for documents missing an indexed field |
//! | Int32 | i32 | compares numerically with Int64/Double |
//! | Int64 | i64 | |
//! | Double | f64 | NaN sorts below every other number |
//! | String | String | UTF-8 |
//! | Document | Document | insertion-ordered field map |
//! | Array | Vec<Value> | |
//! | Binary | Vec<u8> | |
//! | ObjectId | ObjectId | 12-byte time+machine+counter id |
//! | Guid | [u8; 16] | |
//! | Bool | bool | |
//! | DateTime | i64 | milliseconds since the unix epoch |
//! | MaxKey | - | above every value; TAIL sentinel key |
//!
//! ## Ordering
//!
//! Values order by kind rank in the table order above, except the three
//! numeric kinds which compare with each other numerically. The total
//! order is what makes skip-list iteration (and therefore every range
//! query) well defined.
//!
//! ## Codec
//!
//! Little-endian, one type byte per value, length-prefixed UTF-8 strings,
//! `u32` element counts for documents and arrays. `encode` rejects trees
//! nested deeper than `MAX_DOCUMENT_DEPTH`; `decode` rejects unknown tags
//! and truncated buffers.

mod codec;
#[allow(clippy::module_inception)]
mod document;
mod objectid;
mod value;

pub use codec::{decode_document, encode_document};
pub(crate) use codec::{read_value, write_value, ByteReader};
pub use document::Document;
pub use objectid::ObjectId;
pub use value::Value;

/// Builds a [`Document`] from `"field" => value` pairs.
///
/// ```
/// use kitedb::doc;
///
/// let d = doc! { "_id" => 1, "name" => "alice" };
/// assert_eq!(d.len(), 2);
/// ```
#[macro_export]
macro_rules! doc {
    () => { $crate::Document::new() };
    ( $( $k:expr => $v:expr ),+ $(,)? ) => {{
        let mut d = $crate::Document::new();
        $( d.insert($k, $crate::Value::from($v)); )+
        d
    }};
}
