//! Live values of registers and bit-fields, kept consistent with each other

mod field;
mod peripheral;
mod register;

pub use field::FieldModel;
pub use peripheral::PeripheralModel;
pub use register::RegisterModel;

/// Bit width of every register value
pub const REGISTER_BIT_WIDTH: u32 = 32;
