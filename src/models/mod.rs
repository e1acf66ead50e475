//! Data models for affiliget.

mod product;

pub use product::{Platform, ProductDisplay, ProductRecord, UnknownPlatform};
