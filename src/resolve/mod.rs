//! Resolution components: resource-type matching, field resolution, id
//! extraction, value-type inference, and step back-references.

pub mod backref;
pub mod extract;
pub mod fields;
pub mod infer;
pub mod matcher;
