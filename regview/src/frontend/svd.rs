//! CMSIS-SVD reader
//!
//! Flattens the device into peripherals, registers and fields. Clusters are folded into their
//! registers, which are named `CLUSTER-REG` and placed at the sum of the cluster and register
//! offsets. Arrays declared with `dim` are expanded into one item per index.

use std::{collections::HashMap, ops::RangeInclusive, path};

use crate::{
    error::{CommonParseError, Error, PositionalError, SvdParseError},
    frontend::{validate_register, ValidateLevel},
    model::{
        normalize_description, Access, BitRange, Device, EnumValue, FieldDescriptor,
        PeripheralDescriptor, RegisterDescriptor,
    },
    util,
};
use itertools::Itertools;
use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;
use roxmltree::Document;

struct XmlNode<'a, 'input>(roxmltree::Node<'a, 'input>);

impl<'a, 'input> XmlNode<'a, 'input> {
    fn find_text_by_tag_name(
        &self,
        tag: &str,
    ) -> Result<(&'a str, XmlNode<'a, 'input>), PositionalError<SvdParseError>> {
        self.maybe_find_text_by_tag_name(tag).ok_or_else(|| {
            SvdParseError::ExpectedTagInElement {
                elem_name: self.0.tag_name().name().to_owned(),
                tag: tag.to_owned(),
            }
            .with_byte_pos_range(self.0.range(), self.0.document())
        })
    }

    /// Empty elements yield an empty string
    fn maybe_find_text_by_tag_name(&self, tag: &str) -> Option<(&'a str, XmlNode<'a, 'input>)> {
        self.0
            .children()
            .find(|n| n.has_tag_name(tag))
            .map(|n| (n.text().unwrap_or_default().trim(), XmlNode(n)))
    }

    fn children_with_tag_name(&self, tag: &str) -> Vec<XmlNode<'a, 'input>> {
        self.0
            .children()
            .filter(|n| n.has_tag_name(tag))
            .map(XmlNode)
            .collect_vec()
    }

    fn description(&self) -> String {
        normalize_description(self.maybe_find_text_by_tag_name("description").map(|(s, _)| s))
    }
}

/// Add text position information to an [`SvdParseError`] converting it into a [`PositionalError`]
fn err_with_pos(e: impl Into<SvdParseError>, node: &XmlNode) -> PositionalError<SvdParseError> {
    e.into()
        .with_byte_pos_range(node.0.range(), node.0.document())
}

/// Finds a property from `node` by `tag`, calling `process` for its contents if present
fn process_prop_from_node_if_present<T, F>(
    tag: &str,
    node: &XmlNode,
    process: F,
) -> Result<Option<T>, PositionalError<SvdParseError>>
where
    F: Fn(&str) -> Result<T, SvdParseError>,
{
    node.maybe_find_text_by_tag_name(tag)
        .map(|(s, prop_node)| process(s).map_err(|e| err_with_pos(e, &prop_node)))
        .transpose()
}

fn find_nonneg_int(node: &XmlNode, tag: &str) -> Result<u64, PositionalError<SvdParseError>> {
    let (text, prop_node) = node.find_text_by_tag_name(tag)?;
    parse_nonneg_int(text).map_err(|e| err_with_pos(e, &prop_node))
}

fn check_node_count<'a, 'input>(
    node: &XmlNode,
    node_name: &str,
    vector: Vec<XmlNode<'a, 'input>>,
    expected_count: RangeInclusive<usize>,
) -> Result<Vec<XmlNode<'a, 'input>>, PositionalError<SvdParseError>> {
    let actual_count = vector.len();
    if expected_count.contains(&actual_count) {
        Ok(vector)
    } else {
        let error = SvdParseError::InvalidNodeCount {
            node_name: node_name.to_owned(),
            expected_count,
            actual_count,
        };
        Err(err_with_pos(error, node))
    }
}

/// Returns the multiplier for a size suffix, e.g., `k` for kibi
fn binary_size_mult_from_char(c: char) -> Result<u64, SvdParseError> {
    match c {
        'k' | 'K' => Ok(1024),
        'm' | 'M' => Ok(1024 * 1024),
        'g' | 'G' => Ok(1024 * 1024 * 1024),
        't' | 'T' => Ok(1024 * 1024 * 1024 * 1024),
        _ => Err(SvdParseError::InvalidSizeMultiplierSuffix(c)),
    }
}

/// Parses a `scaledNonNegativeInteger` from `text`
///
/// Accepts decimal, `0x`-prefixed hexadecimal and `0b`- or `#`-prefixed binary, with an optional
/// size multiplier suffix on decimal and hexadecimal numbers.
pub(crate) fn parse_nonneg_int(text: &str) -> Result<u64, SvdParseError> {
    // Compile Regexes only once as recommended by the documentation of the Regex crate
    lazy_static! {
        /// Regular expression to capture hexadecimal numbers, as defined in CMSIS-SVD schema
        static ref HEX_NONNEG_INT_RE: Regex = Regex::new(
            r"(?x)              # insignificant whitespace
            ^\+?                # zero or one plus sign
            (?:0x|0X)           # hexadecimal prefix
            ([[:xdigit:]]+)     # one or more hexadecimal digits (captured as #1)
            [[:space:]]?        # zero or one of whitespace
            ([kmgtKMGT])?$      # zero or one of kilo, mega, giga, tera identifier (captured as #2)
        ").unwrap();

        /// Regular expression to capture binary numbers, as defined in CMSIS-SVD schema
        static ref BIN_NONNEG_INT_RE: Regex = Regex::new(
            r"(?x)              # insignificant whitespace
            ^\+?                # zero or one plus sign
            (?:0b|0B|\#)        # binary prefix
            ([01]+)$            # one or more binary digits (captured as #1)
        ").unwrap();

        /// Regular expression to capture decimal numbers, as defined in CMSIS-SVD schema
        static ref DEC_NONNEG_INT_RE: Regex = Regex::new(
            r"(?x)              # insignificant whitespace
            ^\+?                # zero or one plus sign
            ([[:digit:]]+)      # one or more decimal digits (captured as #1)
            [[:space:]]?        # zero or one of whitespace
            ([kmgtKMGT])?$      # zero or one of kilo, mega, giga, tera identifier (captured as #2)
        ").unwrap();
    }

    let text = text.trim();
    let (number, size_mult) = if let Some(captures) = HEX_NONNEG_INT_RE.captures(text) {
        (
            u64::from_str_radix(&captures[1], 16)?,
            captures.get(2).map(|m| m.as_str()),
        )
    } else if let Some(captures) = BIN_NONNEG_INT_RE.captures(text) {
        (u64::from_str_radix(&captures[1], 2)?, None)
    } else if let Some(captures) = DEC_NONNEG_INT_RE.captures(text) {
        (captures[1].parse::<u64>()?, captures.get(2).map(|m| m.as_str()))
    } else {
        return Err(SvdParseError::InvalidNonnegInt(text.to_owned()));
    };

    match size_mult.and_then(|s| s.chars().next()) {
        Some(c) => number
            .checked_mul(binary_size_mult_from_char(c)?)
            .ok_or_else(|| SvdParseError::IntOverflow(text.to_owned())),
        None => Ok(number),
    }
}

/// Array declaration of a register, cluster or field
#[derive(Debug)]
struct DimElement {
    increment: u64,
    /// Names substituted for `%s`, one per element
    indices: Vec<String>,
}

impl DimElement {
    fn from_node(node: &XmlNode) -> Result<Option<Self>, PositionalError<SvdParseError>> {
        let Some((dim_text, dim_node)) = node.maybe_find_text_by_tag_name("dim") else {
            return Ok(None);
        };
        let dim = parse_nonneg_int(dim_text).map_err(|e| err_with_pos(e, &dim_node))?;
        let increment = find_nonneg_int(node, "dimIncrement")?;
        let indices = match node.maybe_find_text_by_tag_name("dimIndex") {
            Some((index, index_node)) => {
                let indices = parse_dim_index(index).map_err(|e| err_with_pos(e, &index_node))?;
                if indices.len() as u64 != dim {
                    let name = node
                        .maybe_find_text_by_tag_name("name")
                        .map_or_else(String::new, |(s, _)| s.to_owned());
                    return Err(err_with_pos(
                        SvdParseError::DimIndexMismatch {
                            name,
                            dim,
                            index_count: indices.len(),
                        },
                        &index_node,
                    ));
                }
                indices
            }
            None => (0..dim).map(|i| i.to_string()).collect(),
        };
        Ok(Some(Self { increment, indices }))
    }

    /// Name and offset of each element, given the declared `name` and `offset` of the array
    fn expand(&self, name: &str, offset: u64) -> Result<Vec<(String, u64)>, SvdParseError> {
        self.indices
            .iter()
            .enumerate()
            .map(|(i, index)| {
                let elem_offset = (i as u64)
                    .checked_mul(self.increment)
                    .and_then(|o| o.checked_add(offset))
                    .ok_or_else(|| SvdParseError::IntOverflow(format!("{name}[{index}]")))?;
                Ok::<_, SvdParseError>((expand_name(name, index), elem_offset))
            })
            .collect()
    }
}

/// Substitute `index` into the `%s` placeholder of `name`, dropping array brackets
fn expand_name(name: &str, index: &str) -> String {
    if name.contains("%s") {
        name.replace("[%s]", index).replace("%s", index)
    } else {
        format!("{name}{index}")
    }
}

/// Parses the `dimIndex` forms `0-3`, `A-D` and `a,b,c`
fn parse_dim_index(text: &str) -> Result<Vec<String>, SvdParseError> {
    lazy_static! {
        static ref NUMBERED_RE: Regex = Regex::new(r"^(?P<start>[0-9]+)-(?P<end>[0-9]+)$").unwrap();
        static ref LETTERED_RE: Regex = Regex::new(r"^(?P<start>[A-Z])-(?P<end>[A-Z])$").unwrap();
        static ref LISTED_RE: Regex =
            Regex::new(r"^[_0-9a-zA-Z]+(?:,\s*[_0-9a-zA-Z]+)*$").unwrap();
    }

    let text = text.trim();
    let invalid = || SvdParseError::InvalidDimIndex(text.to_owned());
    if let Some(captures) = NUMBERED_RE.captures(text) {
        let start: u64 = captures["start"].parse()?;
        let end: u64 = captures["end"].parse()?;
        if end < start {
            return Err(invalid());
        }
        Ok((start..=end).map(|i| i.to_string()).collect())
    } else if let Some(captures) = LETTERED_RE.captures(text) {
        let start = captures["start"].chars().next().ok_or_else(invalid)?;
        let end = captures["end"].chars().next().ok_or_else(invalid)?;
        if end < start {
            return Err(invalid());
        }
        Ok((start..=end).map(|c| c.to_string()).collect())
    } else if LISTED_RE.is_match(text) {
        Ok(text.split(',').map(|s| s.trim().to_owned()).collect())
    } else {
        Err(invalid())
    }
}

/// Reads the `access` property of `node`, if present
///
/// An unknown access string is escalated according to `level` and otherwise ignored, leaving the
/// inherited access in place.
fn access_from_node(
    node: &XmlNode,
    level: ValidateLevel,
) -> Result<Option<Access>, PositionalError<SvdParseError>> {
    let Some((text, prop_node)) = node.maybe_find_text_by_tag_name("access") else {
        return Ok(None);
    };
    match text.parse::<Access>() {
        Ok(access) => Ok(Some(access)),
        Err(e) => {
            level
                .check(e.into())
                .map_err(|e| err_with_pos(e, &prop_node))?;
            Ok(None)
        }
    }
}

/// Reads the bit range of a field from any of the three forms CMSIS-SVD allows
fn bit_range_from_node(
    node: &XmlNode,
    name: &str,
) -> Result<BitRange, PositionalError<SvdParseError>> {
    let invalid =
        |desc: String| err_with_pos(CommonParseError::InvalidBitRange(name.to_owned(), desc), node);

    if let Some(offset) = process_prop_from_node_if_present("bitOffset", node, parse_nonneg_int)? {
        let width = process_prop_from_node_if_present("bitWidth", node, parse_nonneg_int)?
            .unwrap_or(1);
        let range = u32::try_from(offset)
            .ok()
            .zip(u32::try_from(width).ok())
            .and_then(|(offset, width)| BitRange::from_offset_width(offset, width));
        return range.ok_or_else(|| invalid(format!("bitOffset {offset}, bitWidth {width}")));
    }
    if let Some(lsb) = process_prop_from_node_if_present("lsb", node, parse_nonneg_int)? {
        let msb = find_nonneg_int(node, "msb")?;
        let range = u32::try_from(lsb)
            .ok()
            .zip(u32::try_from(msb).ok())
            .and_then(|(lsb, msb)| BitRange::new(lsb, msb));
        return range.ok_or_else(|| invalid(format!("lsb {lsb}, msb {msb}")));
    }
    if let Some((text, _)) = node.maybe_find_text_by_tag_name("bitRange") {
        lazy_static! {
            static ref BIT_RANGE_RE: Regex =
                Regex::new(r"^\[(?P<msb>[0-9]+):(?P<lsb>[0-9]+)\]$").unwrap();
        }
        let range = BIT_RANGE_RE.captures(text).and_then(|captures| {
            let msb = captures["msb"].parse().ok()?;
            let lsb = captures["lsb"].parse().ok()?;
            BitRange::new(lsb, msb)
        });
        return range.ok_or_else(|| invalid(text.to_owned()));
    }
    Err(invalid("missing bitOffset, lsb/msb or bitRange".to_owned()))
}

/// Binary values may mark bits as don't-care with `x`, e.g., `0b1x`
fn has_dont_care_bits(text: &str) -> bool {
    let text = text.trim_start_matches('+');
    text.strip_prefix('#')
        .or_else(|| text.strip_prefix("0b"))
        .or_else(|| text.strip_prefix("0B"))
        .is_some_and(|digits| digits.contains(['x', 'X']))
}

fn enums_from_node(node: &XmlNode) -> Result<Vec<EnumValue>, PositionalError<SvdParseError>> {
    let mut enums = vec![];
    for values_node in node.children_with_tag_name("enumeratedValues") {
        if let Some(base) = values_node.0.attribute("derivedFrom") {
            debug!("enumerated values derived from {base} are not resolved");
        }
        for value_node in values_node.children_with_tag_name("enumeratedValue") {
            let (name, _) = value_node.find_text_by_tag_name("name")?;
            // `isDefault` entries have no value of their own
            let Some((text, text_node)) = value_node.maybe_find_text_by_tag_name("value") else {
                debug!("enumerated value {name} has no value, skipping");
                continue;
            };
            if has_dont_care_bits(text) {
                debug!("enumerated value {name} uses don't-care bits ({text}), skipping");
                continue;
            }
            let value = parse_nonneg_int(text).map_err(|e| err_with_pos(e, &text_node))?;
            enums.push(EnumValue {
                value,
                name: name.to_owned(),
                description: value_node.description(),
            });
        }
    }
    Ok(enums)
}

fn process_field(
    field_node: &XmlNode,
    reg_access: Access,
    level: ValidateLevel,
) -> Result<Vec<FieldDescriptor>, PositionalError<SvdParseError>> {
    let (name, _) = field_node.find_text_by_tag_name("name")?;
    let bit_range = bit_range_from_node(field_node, name)?;
    let access = access_from_node(field_node, level)?.unwrap_or(reg_access);
    let description = field_node.description();
    let enums = enums_from_node(field_node)?;

    let field = |name: String, bit_range: BitRange| FieldDescriptor {
        name,
        description: description.clone(),
        bit_range,
        access,
        enums: enums.clone(),
    };

    match DimElement::from_node(field_node)? {
        None => Ok(vec![field(name.to_owned(), bit_range)]),
        Some(dim) => dim
            .expand(name, u64::from(bit_range.lsb()))
            .map_err(|e| err_with_pos(e, field_node))?
            .into_iter()
            .map(|(name, lsb)| {
                u32::try_from(lsb)
                    .ok()
                    .and_then(|lsb| BitRange::from_offset_width(lsb, bit_range.width()))
                    .map(|range| field(name.clone(), range))
                    .ok_or_else(|| {
                        err_with_pos(
                            CommonParseError::InvalidBitRange(name, format!("bit offset {lsb}")),
                            field_node,
                        )
                    })
            })
            .collect(),
    }
}

/// Context inherited by registers from their peripheral and enclosing clusters
#[derive(Clone)]
struct RegisterParent {
    /// Cluster names joined with `-`, empty directly under the peripheral
    prefix: String,
    offset: u64,
    access: Access,
}

impl RegisterParent {
    fn child_name(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_owned()
        } else {
            format!("{}-{name}", self.prefix)
        }
    }

    fn child_offset(&self, offset: u64, name: &str) -> Result<u64, SvdParseError> {
        self.offset
            .checked_add(offset)
            .ok_or_else(|| SvdParseError::IntOverflow(name.to_owned()))
    }
}

/// Name and offset of each instance of `node`, expanding arrays
fn instances(
    node: &XmlNode,
    name: &str,
    offset: u64,
) -> Result<Vec<(String, u64)>, PositionalError<SvdParseError>> {
    match DimElement::from_node(node)? {
        Some(dim) => dim.expand(name, offset).map_err(|e| err_with_pos(e, node)),
        None => Ok(vec![(name.to_owned(), offset)]),
    }
}

fn process_register(
    parent: &RegisterParent,
    register_node: &XmlNode,
    level: ValidateLevel,
) -> Result<Vec<RegisterDescriptor>, PositionalError<SvdParseError>> {
    let (name, _) = register_node.find_text_by_tag_name("name")?;
    let offset = find_nonneg_int(register_node, "addressOffset")?;
    let access = access_from_node(register_node, level)?.unwrap_or(parent.access);
    let description = register_node.description();

    let mut fields = vec![];
    if let Some((_, fields_node)) = register_node.maybe_find_text_by_tag_name("fields") {
        for field_node in fields_node.children_with_tag_name("field") {
            fields.extend(process_field(&field_node, access, level)?);
        }
    }

    let mut registers = vec![];
    for (inst_name, inst_offset) in instances(register_node, name, offset)? {
        let reg = RegisterDescriptor {
            name: parent.child_name(&inst_name),
            description: description.clone(),
            address_offset: parent
                .child_offset(inst_offset, &inst_name)
                .map_err(|e| err_with_pos(e, register_node))?,
            access,
            fields: fields.clone(),
        };
        validate_register(&reg, level).map_err(|e| err_with_pos(e, register_node))?;
        registers.push(reg);
    }
    Ok(registers)
}

fn process_cluster(
    parent: &RegisterParent,
    cluster_node: &XmlNode,
    level: ValidateLevel,
) -> Result<Vec<RegisterDescriptor>, PositionalError<SvdParseError>> {
    let (name, _) = cluster_node.find_text_by_tag_name("name")?;
    let offset = find_nonneg_int(cluster_node, "addressOffset")?;
    let access = access_from_node(cluster_node, level)?.unwrap_or(parent.access);

    let mut registers = vec![];
    for (inst_name, inst_offset) in instances(cluster_node, name, offset)? {
        let current = RegisterParent {
            prefix: parent.child_name(&inst_name),
            offset: parent
                .child_offset(inst_offset, &inst_name)
                .map_err(|e| err_with_pos(e, cluster_node))?,
            access,
        };
        registers.extend(process_registers_node(&current, cluster_node, level)?);
    }
    Ok(registers)
}

/// Processes the `register` and `cluster` children of `node` in declaration order
fn process_registers_node(
    parent: &RegisterParent,
    node: &XmlNode,
    level: ValidateLevel,
) -> Result<Vec<RegisterDescriptor>, PositionalError<SvdParseError>> {
    let mut registers = vec![];
    for child in node.0.children().filter(|n| n.is_element()).map(XmlNode) {
        if child.0.has_tag_name("register") {
            registers.extend(process_register(parent, &child, level)?);
        } else if child.0.has_tag_name("cluster") {
            registers.extend(process_cluster(parent, &child, level)?);
        }
    }
    Ok(registers)
}

fn warn_duplicate_addresses(periph_name: &str, registers: &[RegisterDescriptor]) {
    let mut addresses: HashMap<u64, &str> = HashMap::new();
    for reg in registers {
        if let Some(other) = addresses.insert(reg.address_offset, &reg.name) {
            warn!(
                "register {periph_name}-{} at offset {:#x} shares its address with {periph_name}-{other}",
                reg.name, reg.address_offset
            );
        }
    }
}

fn process_peripheral(
    periph_node: &XmlNode,
    device_access: Access,
    parsed: &[PeripheralDescriptor],
    level: ValidateLevel,
) -> Result<PeripheralDescriptor, PositionalError<SvdParseError>> {
    let (name, _) = periph_node.find_text_by_tag_name("name")?;
    let base_address = find_nonneg_int(periph_node, "baseAddress")?;

    let base = match periph_node.0.attribute("derivedFrom") {
        Some(base_name) => Some(
            parsed
                .iter()
                .find(|p| p.name == base_name)
                .ok_or_else(|| {
                    err_with_pos(
                        SvdParseError::DerivedFromMissing {
                            periph: name.to_owned(),
                            base: base_name.to_owned(),
                        },
                        periph_node,
                    )
                })?,
        ),
        None => None,
    };

    let description = match (
        periph_node.maybe_find_text_by_tag_name("description"),
        base,
    ) {
        (None, Some(base)) => base.description.clone(),
        _ => periph_node.description(),
    };
    let group_name = periph_node
        .maybe_find_text_by_tag_name("groupName")
        .map(|(s, _)| s.to_owned())
        .or_else(|| base.and_then(|b| b.group_name.clone()));

    let registers_nodes = check_node_count(
        periph_node,
        "registers",
        periph_node.children_with_tag_name("registers"),
        0..=1,
    )?;
    let registers = match (registers_nodes.first(), base) {
        (Some(registers_node), _) => {
            let parent = RegisterParent {
                prefix: String::new(),
                offset: 0,
                access: access_from_node(periph_node, level)?.unwrap_or(device_access),
            };
            process_registers_node(&parent, registers_node, level)?
        }
        (None, Some(base)) => base.registers.clone(),
        (None, None) => vec![],
    };
    warn_duplicate_addresses(name, &registers);

    Ok(PeripheralDescriptor::new(
        name.to_owned(),
        description,
        base_address,
        group_name,
        registers,
    ))
}

fn process_device(
    device_node: &XmlNode,
    level: ValidateLevel,
) -> Result<Device, PositionalError<SvdParseError>> {
    let name = device_node
        .maybe_find_text_by_tag_name("name")
        .map_or_else(String::new, |(s, _)| s.to_owned());
    let access = access_from_node(device_node, level)?.unwrap_or_default();

    let peripherals_nodes = check_node_count(
        device_node,
        "peripherals",
        device_node.children_with_tag_name("peripherals"),
        1..=1,
    )?;
    let mut peripherals = vec![];
    for periph_node in peripherals_nodes[0].children_with_tag_name("peripheral") {
        let periph = process_peripheral(&periph_node, access, &peripherals, level)?;
        peripherals.push(periph);
    }
    Ok(Device::new(name, peripherals))
}

fn find_device(parsed: &Document, level: ValidateLevel) -> Result<Device, PositionalError<SvdParseError>> {
    let root = XmlNode(parsed.root());
    let device_nodes = check_node_count(
        &root,
        "device",
        root.children_with_tag_name("device"),
        1..=1,
    )?;
    process_device(&device_nodes[0], level)
}

/// Parse SVD `content` into a device
///
/// `fname` is only used for error reporting.
pub(crate) fn parse_svd_str(content: &str, fname: &str, level: ValidateLevel) -> Result<Device, Error> {
    let parsed = Document::parse(content)?;
    let device = find_device(&parsed, level)
        .map_err(|positional| positional.with_fname(fname.to_owned()))?;
    info!(
        "Found {} peripherals with {} registers in {fname}",
        device.peripherals.len(),
        device.register_count()
    );
    Ok(device)
}

/// Parse the SVD file at `svd_path` into a device
pub(crate) fn parse_svd_file(svd_path: &path::Path, level: ValidateLevel) -> Result<Device, Error> {
    let content = util::read_file(svd_path)?;
    parse_svd_str(&content, &svd_path.display().to_string(), level)
}
