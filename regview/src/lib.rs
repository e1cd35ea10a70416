//! Regview --- Inspect and edit memory-mapped register values described by CMSIS-SVD files.
//!
//! The crate keeps a register's value consistent with its bit-fields and with their textual
//! representations. Reading from and writing to hardware is delegated to an external debug
//! connection through [`RegisterAccess`].

// Export full API at crate root
pub use api::*;

mod access;
mod api;
mod error;
mod filtering;
mod frontend;
mod model;
mod num_field;
mod util;
mod value;
