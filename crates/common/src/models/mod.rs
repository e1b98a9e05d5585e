//! Product catalogue models
//!
//! Read-only snapshots owned by the record store. The engine never mutates them.

mod product;

pub use product::{Aspect, ProductRecord, MAX_ASPECTS};
