//! Exposes functionality supported by this crate
mod error;

use std::path;

use crate::frontend::{json, svd};
use log::info;

pub use crate::{
    access::{AccessRequest, RegisterAccess, RequestLog},
    error::{
        CommonParseError, Error, FormatError, JsonParseError, ModelError, ParseFileError,
        PositionalError, RangeError, SvdParseError,
    },
    filtering::{Filters, ItemFilter},
    frontend::ValidateLevel,
    model::{
        Access, AddrRepr, BitRange, Device, EnumValue, FieldDescriptor, MakeAddrError,
        PeripheralDescriptor, RegisterDescriptor, ADDR_BITS, NO_DESCRIPTION,
    },
    num_field::{format_value, DisplayBase, NumField, Step},
    value::{FieldModel, PeripheralModel, RegisterModel, REGISTER_BIT_WIDTH},
};
pub use error::ApiError;

/// A source file for peripheral, register and field descriptions
#[derive(Clone, Debug)]
pub struct ModelSource {
    path: path::PathBuf,
    format: SourceFormat,
}

impl ModelSource {
    pub fn new(path: path::PathBuf, format: SourceFormat) -> Self {
        Self { path, format }
    }

    /// Pick the format from the extension of `path`, CMSIS-SVD unless it is `.json`
    pub fn from_path(path: path::PathBuf) -> Self {
        let format = match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => SourceFormat::Json,
            _ => SourceFormat::Svd,
        };
        Self::new(path, format)
    }

    pub fn path(&self) -> &path::Path {
        &self.path
    }

    pub fn format(&self) -> SourceFormat {
        self.format
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceFormat {
    /// CMSIS-SVD
    Svd,
    /// Nested JSON descriptors, as written by [`device_to_json`]
    Json,
}

/// Parse `source` into a device, without filtering
pub fn parse_device(source: &ModelSource, level: ValidateLevel) -> Result<Device, ApiError> {
    let device = match source.format {
        SourceFormat::Svd => svd::parse_svd_file(source.path(), level)?,
        SourceFormat::Json => json::parse_json_file(source.path(), level)?,
    };
    Ok(device)
}

/// Parse `source` and keep the peripherals and registers allowed by `filters`
///
/// # Errors
///
/// Besides input errors, it is an error if no peripherals remain after filtering.
pub fn load_device(
    source: &ModelSource,
    filters: &Filters,
    level: ValidateLevel,
) -> Result<Device, ApiError> {
    let device = filters.apply(parse_device(source, level)?);

    // If zero peripherals were chosen, there is nothing to show. Therefore we treat it as an error.
    if device.peripherals.is_empty() {
        return Err(Error::ZeroEntries.into());
    }
    info!(
        "Selected {} peripherals with {} registers",
        device.peripherals.len(),
        device.register_count()
    );
    Ok(device)
}

/// Run the parser on the input without doing anything
///
/// Good for checking whether the input file can be parsed by regview.
pub fn dry_run(source: &ModelSource, level: ValidateLevel) -> Result<(), ApiError> {
    load_device(source, &Filters::all(), level)?;
    Ok(())
}

/// Names of peripherals and their register counts, in order of base address
///
/// Peripherals containing zero registers are omitted.
pub fn list_peripherals(
    source: &ModelSource,
    filters: &Filters,
    level: ValidateLevel,
) -> Result<Vec<(String, usize)>, ApiError> {
    let device = load_device(source, filters, level)?;
    Ok(device
        .peripherals
        .into_iter()
        .filter(|p| !p.registers.is_empty())
        .map(|p| (p.name, p.registers.len()))
        .collect())
}

/// Build the live model of the peripheral called `name`
pub fn build_peripheral(device: &Device, name: &str) -> Result<PeripheralModel, ApiError> {
    let descriptor = device
        .peripheral(name)
        .ok_or_else(|| ApiError::UnknownPeripheral(name.to_owned()))?;
    Ok(PeripheralModel::new(descriptor)?)
}

/// Build the live model of register `reg` of peripheral `periph`
pub fn build_register(device: &Device, periph: &str, reg: &str) -> Result<RegisterModel, ApiError> {
    let descriptor = device
        .peripheral(periph)
        .ok_or_else(|| ApiError::UnknownPeripheral(periph.to_owned()))?;
    let reg_descriptor = descriptor
        .register(reg)
        .ok_or_else(|| ApiError::UnknownRegister {
            periph: periph.to_owned(),
            reg: reg.to_owned(),
        })?;
    Ok(RegisterModel::new(reg_descriptor, descriptor.base_address)?)
}

/// Render `device` in the JSON descriptor format
pub fn device_to_json(device: &Device) -> String {
    json::device_to_json(device).pretty(2)
}
