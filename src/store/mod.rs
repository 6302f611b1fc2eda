//! Remote document store: value codec and REST client.

pub mod client;
pub mod codec;

pub use client::{DocumentStore, StoreClient, StoreConfig};
pub use codec::{decode_document, decode_value, encode_fields, encode_value, DOC_ID_FIELD};
