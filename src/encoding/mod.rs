//! SQL literal encoding
//!
//! - **value**: the `Value` sum type covering every column shape
//! - **encoder**: type-directed rendering of a `Value` into CrateDB literal syntax
//!
//! # Example
//!
//! ```rust
//! use cratedb_sink::encoding::{Encoder, TimeZoneSetting, Value};
//!
//! let encoder = Encoder::new().with_zone(TimeZoneSetting::Utc);
//! let tags = Value::object([("host", "a's-box")]);
//!
//! assert_eq!(encoder.encode(&tags).unwrap(), r#"{"host" = 'a''s-box'}"#);
//! ```

pub mod encoder;
pub mod value;

pub use encoder::{encode, encode_number, quote, reinterpret_identity, Encoder, TimeZoneSetting};
pub use value::{Number, Value};
