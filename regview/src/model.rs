//! Encodes information about memory mapped peripherals, their registers and bit-fields, as read
//! from CMSIS-SVD or JSON descriptors.

mod addr;
mod descriptor;

// Anything that's part of the public API of descriptor is also part of the public API of model
pub use addr::{AddrRepr, MakeAddrError, ADDR_BITS};
pub use descriptor::*;
