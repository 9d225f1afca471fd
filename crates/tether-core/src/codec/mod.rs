//! Codec - app-control bundle のエンコード／デコード

pub mod bundle;

pub use self::bundle::{Bundle, BundleValue, CodecError, EncodedBundle};
