//! # tds74-types
//!
//! Host-side value handling for the TDS 7.4 driver: the [`Value`] a column
//! decodes to, the [`Param`] a request carries, the per-type-id column
//! decoder and the parameter wire encodings.

pub mod decode;
pub mod encode;
pub mod error;
pub mod value;

pub use decode::{PLP_MAX_SIZE, decode_ucs2, decode_value};
pub use encode::encode_param;
pub use error::TypeError;
pub use value::{Param, Value};
