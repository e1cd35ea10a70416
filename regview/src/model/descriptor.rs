//! Read-only descriptions of peripherals, registers and bit-fields as declared in the input

use std::{fmt, str};

use crate::error;
use itertools::Itertools;

/// Description used for items that do not declare one
pub const NO_DESCRIPTION: &str = "No description";

/// Collapse newlines and runs of whitespace into single spaces
///
/// Returns [`NO_DESCRIPTION`] for missing or blank descriptions.
pub(crate) fn normalize_description(descr: Option<&str>) -> String {
    match descr.map(|d| d.split_whitespace().join(" ")) {
        Some(d) if !d.is_empty() => d,
        _ => NO_DESCRIPTION.to_owned(),
    }
}

/// A device, i.e., the list of its peripherals ordered by base address
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Device {
    pub name: String,
    pub peripherals: Vec<PeripheralDescriptor>,
}

impl Device {
    pub fn new(name: String, mut peripherals: Vec<PeripheralDescriptor>) -> Self {
        peripherals.sort_by_key(|p| p.base_address);
        Self { name, peripherals }
    }

    pub fn peripheral(&self, name: &str) -> Option<&PeripheralDescriptor> {
        self.peripherals.iter().find(|p| p.name == name)
    }

    /// Peripherals grouped by their `groupName`, in order of first appearance
    ///
    /// A peripheral without a group forms a group of its own under its own name.
    pub fn groups(&self) -> Vec<(String, Vec<&PeripheralDescriptor>)> {
        let mut groups: Vec<(String, Vec<&PeripheralDescriptor>)> = vec![];
        for periph in &self.peripherals {
            let key = periph.group_name.as_ref().unwrap_or(&periph.name).clone();
            match groups.iter_mut().find(|(name, _)| *name == key) {
                Some((_, members)) => members.push(periph),
                None => groups.push((key, vec![periph])),
            }
        }
        groups
    }

    pub fn register_count(&self) -> usize {
        self.peripherals.iter().map(|p| p.registers.len()).sum()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeripheralDescriptor {
    pub name: String,
    pub description: String,
    pub base_address: u64,
    pub group_name: Option<String>,
    /// Registers ordered by address offset
    pub registers: Vec<RegisterDescriptor>,
}

impl PeripheralDescriptor {
    pub fn new(
        name: String,
        description: String,
        base_address: u64,
        group_name: Option<String>,
        mut registers: Vec<RegisterDescriptor>,
    ) -> Self {
        registers.sort_by_key(|r| r.address_offset);
        Self {
            name,
            description,
            base_address,
            group_name,
            registers,
        }
    }

    pub fn register(&self, name: &str) -> Option<&RegisterDescriptor> {
        self.registers.iter().find(|r| r.name == name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterDescriptor {
    pub name: String,
    pub description: String,
    /// Offset from the base address of the owning peripheral
    pub address_offset: u64,
    pub access: Access,
    /// Fields in declaration order
    pub fields: Vec<FieldDescriptor>,
}

impl RegisterDescriptor {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Pairs of fields that share at least one bit
    pub fn overlapping_fields(&self) -> Vec<(&FieldDescriptor, &FieldDescriptor)> {
        self.fields
            .iter()
            .tuple_combinations()
            .filter(|(a, b)| a.bit_range.overlaps(&b.bit_range))
            .collect()
    }
}

/// One-line summary, e.g., `(0x00000004)<RW> : CTRL`
impl fmt::Display for RegisterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:#010x})<{}> : {}",
            self.address_offset,
            self.access.short_str(),
            self.name
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub description: String,
    pub bit_range: BitRange,
    pub access: Access,
    /// Enumerated values in declaration order, possibly empty
    pub enums: Vec<EnumValue>,
}

impl FieldDescriptor {
    /// Enumerated values that cannot be represented in the bit width of the field
    pub fn enums_out_of_range(&self) -> impl Iterator<Item = &EnumValue> {
        let mask = self.bit_range.mask();
        self.enums.iter().filter(move |e| e.value & !mask != 0)
    }
}

/// One-line summary, e.g., `[7:4]<RW> : MODE`
impl fmt::Display for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}<{}> : {}",
            self.bit_range,
            self.access.short_str(),
            self.name
        )
    }
}

/// A named meaning for a value of a bit-field
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumValue {
    pub value: u64,
    pub name: String,
    pub description: String,
}

impl fmt::Display for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:#x}) {} : {}", self.value, self.name, self.description)
    }
}

/// Contiguous range of bits `[lsb, msb]` within a register
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BitRange {
    lsb: u32,
    msb: u32,
}

impl BitRange {
    /// Returns None if `msb < lsb` or if the range does not fit in 64 bits
    pub const fn new(lsb: u32, msb: u32) -> Option<Self> {
        if msb < lsb || msb >= u64::BITS {
            return None;
        }
        Some(Self { lsb, msb })
    }

    /// CMSIS-SVD `bitOffset` and `bitWidth` style constructor
    pub const fn from_offset_width(offset: u32, width: u32) -> Option<Self> {
        if width == 0 {
            return None;
        }
        match offset.checked_add(width - 1) {
            Some(msb) => Self::new(offset, msb),
            None => None,
        }
    }

    pub const fn lsb(&self) -> u32 {
        self.lsb
    }

    pub const fn msb(&self) -> u32 {
        self.msb
    }

    pub const fn width(&self) -> u32 {
        self.msb - self.lsb + 1
    }

    /// Mask of `width` ones, not shifted into place
    pub const fn mask(&self) -> u64 {
        u64::MAX >> (u64::BITS - self.width())
    }

    /// Value of the bits in this range of `reg`
    pub const fn extract(&self, reg: u64) -> u64 {
        (reg >> self.lsb) & self.mask()
    }

    /// Replace the bits of this range in `reg` with `value`, preserving all other bits
    ///
    /// Bits of `value` beyond the width of the range are discarded.
    pub const fn deposit(&self, reg: u64, value: u64) -> u64 {
        (reg & !(self.mask() << self.lsb)) | ((value & self.mask()) << self.lsb)
    }

    pub const fn overlaps(&self, other: &BitRange) -> bool {
        self.lsb <= other.msb && other.lsb <= self.msb
    }
}

impl fmt::Display for BitRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}]", self.msb, self.lsb)
    }
}

/// Software access rights e.g., read-only or read-write, as defined by
/// CMSIS-SVD `accessType`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Access {
    /// read-only
    ReadOnly,
    /// write-only
    WriteOnly,
    /// read-write
    #[default]
    ReadWrite,
    /// writeOnce
    WriteOnce,
    /// read-writeOnce
    ReadWriteOnce,
}

impl Access {
    /// Whether this register is software readable or not
    #[must_use]
    pub const fn is_read(&self) -> bool {
        match self {
            Self::ReadOnly | Self::ReadWrite | Self::ReadWriteOnce => true,
            Self::WriteOnly | Self::WriteOnce => false,
        }
    }

    /// Whether this register is software writable or not
    #[must_use]
    pub const fn is_write(&self) -> bool {
        match self {
            Self::ReadOnly => false,
            Self::WriteOnly | Self::ReadWrite | Self::WriteOnce | Self::ReadWriteOnce => true,
        }
    }

    /// Abbreviation used in labels, e.g., `RW`
    pub const fn short_str(&self) -> &'static str {
        match self {
            Self::ReadOnly => "RO",
            Self::WriteOnly => "WO",
            Self::ReadWrite => "RW",
            Self::WriteOnce => "W1",
            Self::ReadWriteOnce => "RW1",
        }
    }
}

impl str::FromStr for Access {
    type Err = error::CommonParseError;

    /// Convert from CMSIS-SVD `accessType` string
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read-only" => Ok(Self::ReadOnly),
            "write-only" => Ok(Self::WriteOnly),
            "read-write" => Ok(Self::ReadWrite),
            "writeOnce" => Ok(Self::WriteOnce),
            "read-writeOnce" => Ok(Self::ReadWriteOnce),
            s => Err(error::CommonParseError::InvalidAccessType(s.to_owned())),
        }
    }
}

impl fmt::Display for Access {
    /// Convert into CMSIS-SVD `accessType` string
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ReadOnly => "read-only",
            Self::WriteOnly => "write-only",
            Self::ReadWrite => "read-write",
            Self::WriteOnce => "writeOnce",
            Self::ReadWriteOnce => "read-writeOnce",
        })
    }
}
