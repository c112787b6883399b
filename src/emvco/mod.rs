//! EMVCo Merchant-Presented QR payloads: decoding and PromptPay generation.

pub mod promptpay;
pub mod tlv;

pub use tlv::{Entry, TagMap};
