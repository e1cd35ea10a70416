use std::fmt;

use thiserror::Error;

/// Number of bits in the address space of the targets debugged through OpenOCD
pub const ADDR_BITS: u32 = 32;

/// Absolute address of a register together with the peripheral base and offset it was declared with
///
/// Cluster offsets are already folded into `offset`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddrRepr {
    base: u64,
    offset: u64,
    full: u64,
}

impl AddrRepr {
    /// Fails when `base + offset` does not fit in `size` bits
    ///
    /// # Arguments
    ///
    /// * `size` - Number of bits used to represent this address (target pointer)
    pub fn from_base_offset(base: u64, offset: u64, size: u32) -> Result<Self, MakeAddrError> {
        let full = make_addr(&[base, offset], size, None)?;
        Ok(Self { base, offset, full })
    }

    /// Absolute address
    pub fn full(&self) -> u64 {
        self.full
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    /// Offset relative to the peripheral base
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

#[derive(Error, Clone, Debug, PartialEq, Eq)]
#[error(
    "overflow: could not make components {src:?} into an address of size {size} (bits), id: {id:?}"
)]
pub struct MakeAddrError {
    /// Source offsets for the address
    pub(crate) src: Vec<u64>,
    /// Number of bits used to represent this address (target pointer)
    pub(crate) size: u32,
    /// Optional identifier
    pub(crate) id: Option<String>,
}

impl MakeAddrError {
    pub(crate) fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

fn bits_required(val: u64) -> u32 {
    64 - val.leading_zeros()
}

#[test]
fn bits_required_works() {
    let test = bits_required;

    assert_eq!(test(u64::MAX), 64);
    assert_eq!(test(u32::MAX.into()), 32);
    assert_eq!(test(u16::MAX.into()), 16);
    assert_eq!(test(u8::MAX.into()), 8);
    assert_eq!(test(0b1), 1);
    assert_eq!(test(0b11), 2);
    assert_eq!(test(0b101), 3);
}

/// Sum `offsets` into an address
///
/// Validates that the components can form an address that can be represented using the given size
/// (target pointer).
///
/// # Arguments
///
/// * `offsets` - List of offsets to use to form the address
/// * `size` - Number of bits used to represent this address (target pointer)
/// * `id`  - Optional address identifier for debug and tracing purposes
fn make_addr(offsets: &[u64], size: u32, id: Option<String>) -> Result<u64, MakeAddrError> {
    let err = || MakeAddrError {
        src: offsets.to_vec(),
        size,
        id: id.clone(),
    };

    // Sum of the components
    let addr = offsets
        .iter()
        .try_fold(0u64, |acc, x| acc.checked_add(*x))
        .ok_or_else(|| err())?;

    // Must fit the address space
    if bits_required(addr) > size {
        return Err(err());
    }

    Ok(addr)
}

#[test]
fn make_addr_detects_overflow() {
    assert_eq!(make_addr(&[0x4001_0000, 0x0c], 32, None), Ok(0x4001_000c));
    assert_eq!(make_addr(&[0x4001_0000, 0x10, 0x04], 32, None), Ok(0x4001_0014));
    assert!(make_addr(&[0xffff_fffc, 0x04], 32, None).is_err());
    assert!(make_addr(&[u64::MAX, 0x01], 64, None).is_err());
    assert_eq!(make_addr(&[0xffff_fffc, 0x04], 64, None), Ok(0x1_0000_0000));
}

impl fmt::Display for AddrRepr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x} ({:#x} + {:#x})", self.full, self.base, self.offset)
    }
}

#[test]
fn addr_repr_shows_base_and_offset() {
    let addr = AddrRepr::from_base_offset(0x4000_0000, 0x108, ADDR_BITS).unwrap();
    assert_eq!(addr.full(), 0x4000_0108);
    assert_eq!(addr.base(), 0x4000_0000);
    assert_eq!(addr.offset(), 0x108);
    assert_eq!(addr.to_string(), "0x40000108 (0x40000000 + 0x108)");

    let err = AddrRepr::from_base_offset(0xffff_fffc, 0x8, ADDR_BITS).unwrap_err();
    assert_eq!(err.src, [0xffff_fffc, 0x8]);
}
