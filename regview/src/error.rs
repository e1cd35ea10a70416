use std::{fmt, io, ops};

use crate::{model::MakeAddrError, num_field::DisplayBase};
use thiserror::Error;

/// A value does not fit in the bit width of the number it was assigned to
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("value {value:#x} does not fit in {bit_width} bits")]
pub struct RangeError {
    pub(crate) value: u64,
    pub(crate) bit_width: u32,
}

impl RangeError {
    /// The rejected value
    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn bit_width(&self) -> u32 {
        self.bit_width
    }
}

/// Text does not match the grammar of the active display base
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{text:?} is not a valid {bit_width}-bit {base} number")]
pub struct FormatError {
    pub(crate) text: String,
    pub(crate) base: DisplayBase,
    pub(crate) bit_width: u32,
}

impl FormatError {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn base(&self) -> DisplayBase {
        self.base
    }
}

/// Error raised by the register and field value models
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error(transparent)]
    Range(#[from] RangeError),
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error("register {reg} has no field named {field:?}")]
    UnknownField { reg: String, field: String },
    #[error("field {field} has no enumerated value at index {index}")]
    UnknownEnum { field: String, index: usize },
    #[error("peripheral {periph} has no register at address {addr:#010x}")]
    UnknownAddress { periph: String, addr: u64 },
    #[error("register {0} is not readable")]
    NotReadable(String),
    #[error("register {0} is not writable")]
    NotWritable(String),
    #[error("register {0} is not connected to a register access service")]
    NotConnected(String),
    #[error("field {field} {bits} does not fit in the {width}-bit register {reg}")]
    FieldOutOfRegister {
        reg: String,
        field: String,
        bits: String,
        width: u32,
    },
    #[error("cannot place register in the address space")]
    AddrOverflow(#[from] MakeAddrError),
}

/// Problems found in CMSIS-SVD input or the JSON descriptor format
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommonParseError {
    #[error("invalid access type in input: {0}")]
    InvalidAccessType(String),
    #[error("invalid bit range for field {0}: {1}")]
    InvalidBitRange(String, String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot read input file")]
    Io(#[from] io::Error),
    #[error("input is not well-formed XML")]
    Xml(#[from] roxmltree::Error),
    #[error("error while parsing SVD")]
    SvdParse(#[from] ParseFileError<SvdParseError>),
    #[error("error while parsing JSON descriptors")]
    JsonParse(#[from] JsonParseError),
    #[error("invalid filter pattern")]
    Regex(#[from] regex::Error),
    #[error("zero entries were chosen from input, either the file doesn't have any peripheral definitions, or they were all ignored by current filters")]
    ZeroEntries,
}

#[derive(Error, Debug)]
#[error("CMSIS-SVD parse error --> {fname}:{err}")]
pub struct ParseFileError<T> {
    fname: String,
    err: PositionalError<T>,
}

/// Location of an error in the input text
///
/// Lines and columns count from 1.
#[derive(Debug)]
pub(crate) enum Position {
    Point {
        line: u32,
        col: u32,
    },
    Line {
        line: u32,
        start_col: u32,
        end_col: u32,
    },
    MultiLine {
        start_line: u32,
        start_col: u32,
        end_line: u32,
        end_col: u32,
    },
}

impl From<ops::Range<roxmltree::TextPos>> for Position {
    fn from(value: ops::Range<roxmltree::TextPos>) -> Self {
        if value.start.row == value.end.row {
            // Single character
            if value.start.col == value.end.col {
                Position::Point {
                    line: value.start.row,
                    col: value.start.col,
                }
            }
            // Span within one line
            else {
                Position::Line {
                    line: value.start.row,
                    start_col: value.start.col,
                    end_col: value.end.col,
                }
            }
        }
        // Span over several lines
        else {
            Position::MultiLine {
                start_line: value.start.row,
                start_col: value.start.col,
                end_line: value.end.row,
                end_col: value.end.col,
            }
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Point { line, col } => write!(f, "{line}:{col}"),
            Position::Line {
                line,
                start_col,
                end_col,
            } => write!(f, "{line}:{start_col}-{end_col}"),
            Position::MultiLine {
                start_line,
                start_col,
                end_line,
                end_col,
            } => write!(f, "{start_line}:{start_col}..{end_line}:{end_col}"),
        }
    }
}

#[derive(Error, Debug)]
#[error("{pos}\n{err}")]
pub struct PositionalError<T> {
    pos: Position,
    err: T,
}

impl<T> PositionalError<T> {
    pub(crate) fn with_fname(self, fname: String) -> ParseFileError<T> {
        ParseFileError { fname, err: self }
    }

    /// The error without position information
    pub fn error(&self) -> &T {
        &self.err
    }
}

/// Problems found in CMSIS-SVD input
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SvdParseError {
    #[error("expected tag {tag:?} in element {elem_name:?}")]
    ExpectedTagInElement { elem_name: String, tag: String },
    #[error("expected {expected_count:?} {node_name:?} elements, found {actual_count}")]
    InvalidNodeCount {
        node_name: String,
        expected_count: ops::RangeInclusive<usize>,
        actual_count: usize,
    },
    #[error("element {0:?} has no text")]
    EmptyText(String),
    #[error("could not parse int")]
    ParseInt(#[from] std::num::ParseIntError),
    #[error("could not parse nonneg int from {0}")]
    InvalidNonnegInt(String),
    #[error("invalid size multiplier suffix: {0}")]
    InvalidSizeMultiplierSuffix(char),
    #[error("value {0} overflows 64 bits")]
    IntOverflow(String),
    #[error("generic parse error")]
    GenericParse(#[from] CommonParseError),
    #[error("peripheral {periph} is derived from {base}, which was not declared before it")]
    DerivedFromMissing { periph: String, base: String },
    #[error("array {name} has {dim} elements but {index_count} indices")]
    DimIndexMismatch {
        name: String,
        dim: u64,
        index_count: usize,
    },
    #[error("invalid dimIndex: {0}")]
    InvalidDimIndex(String),
    #[error("fields {0} and {1} of register {2} overlap")]
    OverlappingFields(String, String, String),
    #[error("enumerated value {value:#x} ({name}) does not fit in field {field}")]
    EnumOutOfRange {
        field: String,
        name: String,
        value: u64,
    },
}

impl SvdParseError {
    /// Attach the row and column range `pos` of the input
    pub(crate) fn with_text_pos_range(
        self,
        pos: ops::Range<roxmltree::TextPos>,
    ) -> PositionalError<SvdParseError> {
        PositionalError {
            pos: pos.into(),
            err: self,
        }
    }

    pub(crate) fn with_byte_pos_range(
        self,
        byte_pos: ops::Range<usize>,
        doc: &roxmltree::Document,
    ) -> PositionalError<SvdParseError> {
        let text_pos = ops::Range {
            start: doc.text_pos_at(byte_pos.start),
            end: doc.text_pos_at(byte_pos.end),
        };
        self.with_text_pos_range(text_pos)
    }
}

/// Error that happened while reading descriptors from JSON
#[derive(Error, Debug)]
pub enum JsonParseError {
    #[error("malformed JSON")]
    Json(#[from] json::Error),
    #[error("field not found: {0}")]
    FieldNotFound(String),
    #[error("expected an object, found {0}")]
    ExpectedObject(String),
    #[error("expected an array, found {0}")]
    ExpectedArray(String),
    #[error("field {field:?} is not a {expected}")]
    UnexpectedType {
        field: String,
        expected: &'static str,
    },
    #[error("invalid descriptor")]
    Invalid(#[from] SvdParseError),
    #[error("generic parse error")]
    GenericParse(#[from] CommonParseError),
}
