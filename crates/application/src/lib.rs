//! Query option processing: capability resolution, validation, binding and
//! result shaping for OData-style collection queries.

#![forbid(unsafe_code)]

pub mod binders;
pub mod executor;
pub mod expression;
#[cfg(test)]
mod fixtures;
pub mod options;
pub mod query;
pub mod resolver;
pub mod validators;
pub mod wrappers;
