//! DeepL translation runtime.
//!
//! DeepL only answers the translation stage; the other stages need a chat
//! model. API docs: https://developers.deepl.com/docs/api-reference/translate

mod client;
pub mod dto;

pub use client::{DeepLClient, DeepLRuntime};
