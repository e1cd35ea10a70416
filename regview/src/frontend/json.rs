//! JSON descriptor format
//!
//! The document is an array of peripherals, each carrying its registers, fields and enumerated
//! values as nested objects. Numbers may be given either as JSON numbers or as strings in any
//! notation accepted by CMSIS-SVD, e.g., `"0x40001000"`.

use std::path;

use crate::{
    error::{CommonParseError, Error, JsonParseError},
    frontend::{svd::parse_nonneg_int, validate_register, ValidateLevel},
    model::{
        normalize_description, Access, BitRange, Device, EnumValue, FieldDescriptor,
        PeripheralDescriptor, RegisterDescriptor,
    },
    util,
};
use json::{object::Object, JsonValue};
use log::info;

fn as_object(value: &JsonValue) -> Result<&Object, JsonParseError> {
    match value {
        JsonValue::Object(object) => Ok(object),
        _ => Err(JsonParseError::ExpectedObject(value.dump())),
    }
}

fn as_array(value: &JsonValue) -> Result<&[JsonValue], JsonParseError> {
    match value {
        JsonValue::Array(array) => Ok(array.as_slice()),
        _ => Err(JsonParseError::ExpectedArray(value.dump())),
    }
}

fn unexpected(field: &str, expected: &'static str) -> JsonParseError {
    JsonParseError::UnexpectedType {
        field: field.to_owned(),
        expected,
    }
}

/// Returns the value of `field`, treating `null` as missing
fn maybe_get<'a>(obj: &'a Object, field: &str) -> Option<&'a JsonValue> {
    obj.get(field).filter(|v| !v.is_null())
}

fn get<'a>(obj: &'a Object, field: &str) -> Result<&'a JsonValue, JsonParseError> {
    maybe_get(obj, field).ok_or_else(|| JsonParseError::FieldNotFound(field.to_owned()))
}

fn maybe_get_str<'a>(obj: &'a Object, field: &str) -> Result<Option<&'a str>, JsonParseError> {
    maybe_get(obj, field)
        .map(|v| v.as_str().ok_or_else(|| unexpected(field, "string")))
        .transpose()
}

fn get_str<'a>(obj: &'a Object, field: &str) -> Result<&'a str, JsonParseError> {
    maybe_get_str(obj, field)?.ok_or_else(|| JsonParseError::FieldNotFound(field.to_owned()))
}

fn get_u64(obj: &Object, field: &str) -> Result<u64, JsonParseError> {
    let value = get(obj, field)?;
    if value.is_number() {
        value
            .as_u64()
            .ok_or_else(|| unexpected(field, "non-negative integer"))
    } else {
        let text = value
            .as_str()
            .ok_or_else(|| unexpected(field, "non-negative integer"))?;
        Ok(parse_nonneg_int(text)?)
    }
}

fn get_u32(obj: &Object, field: &str) -> Result<u32, JsonParseError> {
    u32::try_from(get_u64(obj, field)?).map_err(|_| unexpected(field, "32-bit integer"))
}

/// Array under `field`, empty when missing
fn get_array<'a>(obj: &'a Object, field: &str) -> Result<&'a [JsonValue], JsonParseError> {
    match maybe_get(obj, field) {
        Some(value) => as_array(value),
        None => Ok(Default::default()),
    }
}

fn get_access(
    obj: &Object,
    level: ValidateLevel,
    inherited: Option<Access>,
) -> Result<Access, JsonParseError> {
    let Some(text) = maybe_get_str(obj, "access")? else {
        return inherited.ok_or_else(|| JsonParseError::FieldNotFound("access".to_owned()));
    };
    match text.parse::<Access>() {
        Ok(access) => Ok(access),
        Err(e) => {
            level.check(e.into())?;
            Ok(inherited.unwrap_or_default())
        }
    }
}

impl TryFrom<&JsonValue> for EnumValue {
    type Error = JsonParseError;

    fn try_from(value: &JsonValue) -> Result<Self, Self::Error> {
        let obj = as_object(value)?;
        Ok(Self {
            value: get_u64(obj, "value")?,
            name: get_str(obj, "name")?.to_owned(),
            description: normalize_description(maybe_get_str(obj, "description")?),
        })
    }
}

fn field_from_json(
    value: &JsonValue,
    reg_access: Access,
    level: ValidateLevel,
) -> Result<FieldDescriptor, JsonParseError> {
    let obj = as_object(value)?;
    let name = get_str(obj, "name")?.to_owned();
    let lsb = get_u32(obj, "lsb")?;
    let msb = get_u32(obj, "msb")?;
    let bit_range = BitRange::new(lsb, msb).ok_or_else(|| {
        CommonParseError::InvalidBitRange(name.clone(), format!("[{msb}:{lsb}]"))
    })?;
    let enums = get_array(obj, "enums")?
        .iter()
        .map(EnumValue::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(FieldDescriptor {
        description: normalize_description(maybe_get_str(obj, "description")?),
        access: get_access(obj, level, Some(reg_access))?,
        name,
        bit_range,
        enums,
    })
}

fn register_from_json(
    value: &JsonValue,
    level: ValidateLevel,
) -> Result<RegisterDescriptor, JsonParseError> {
    let obj = as_object(value)?;
    let access = get_access(obj, level, None)?;
    let fields = get_array(obj, "fields")?
        .iter()
        .map(|f| field_from_json(f, access, level))
        .collect::<Result<Vec<_>, _>>()?;
    let reg = RegisterDescriptor {
        name: get_str(obj, "name")?.to_owned(),
        description: normalize_description(maybe_get_str(obj, "description")?),
        address_offset: get_u64(obj, "address_offset")?,
        access,
        fields,
    };
    validate_register(&reg, level)?;
    Ok(reg)
}

fn peripheral_from_json(
    value: &JsonValue,
    level: ValidateLevel,
) -> Result<PeripheralDescriptor, JsonParseError> {
    let obj = as_object(value)?;
    let registers = get_array(obj, "registers")?
        .iter()
        .map(|r| register_from_json(r, level))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(PeripheralDescriptor::new(
        get_str(obj, "name")?.to_owned(),
        normalize_description(maybe_get_str(obj, "description")?),
        get_u64(obj, "base_address")?,
        maybe_get_str(obj, "group_name")?.map(ToOwned::to_owned),
        registers,
    ))
}

/// Parse a JSON descriptor document into a device called `name`
pub(crate) fn parse_json_str(
    content: &str,
    name: &str,
    level: ValidateLevel,
) -> Result<Device, JsonParseError> {
    let parsed = json::parse(content)?;
    let peripherals = as_array(&parsed)?
        .iter()
        .map(|p| peripheral_from_json(p, level))
        .collect::<Result<Vec<_>, _>>()?;
    let device = Device::new(name.to_owned(), peripherals);
    info!(
        "Found {} peripherals with {} registers in JSON descriptors",
        device.peripherals.len(),
        device.register_count()
    );
    Ok(device)
}

/// Parse the JSON descriptor file at `json_path`, naming the device after the file
pub(crate) fn parse_json_file(json_path: &path::Path, level: ValidateLevel) -> Result<Device, Error> {
    let content = util::read_file(json_path)?;
    let name = json_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(parse_json_str(&content, &name, level)?)
}

fn hex(value: u64) -> JsonValue {
    format!("{value:#x}").into()
}

fn enum_to_json(e: &EnumValue) -> JsonValue {
    let mut obj = Object::new();
    obj.insert("value", e.value.into());
    obj.insert("name", e.name.as_str().into());
    obj.insert("description", e.description.as_str().into());
    JsonValue::Object(obj)
}

fn field_to_json(field: &FieldDescriptor) -> JsonValue {
    let mut obj = Object::new();
    obj.insert("name", field.name.as_str().into());
    obj.insert("description", field.description.as_str().into());
    obj.insert("access", field.access.to_string().into());
    obj.insert("lsb", field.bit_range.lsb().into());
    obj.insert("msb", field.bit_range.msb().into());
    obj.insert(
        "enums",
        JsonValue::Array(field.enums.iter().map(enum_to_json).collect()),
    );
    JsonValue::Object(obj)
}

fn register_to_json(reg: &RegisterDescriptor) -> JsonValue {
    let mut obj = Object::new();
    obj.insert("name", reg.name.as_str().into());
    obj.insert("description", reg.description.as_str().into());
    obj.insert("access", reg.access.to_string().into());
    obj.insert("address_offset", hex(reg.address_offset));
    obj.insert(
        "fields",
        JsonValue::Array(reg.fields.iter().map(field_to_json).collect()),
    );
    JsonValue::Object(obj)
}

fn peripheral_to_json(periph: &PeripheralDescriptor) -> JsonValue {
    let mut obj = Object::new();
    obj.insert("name", periph.name.as_str().into());
    obj.insert("description", periph.description.as_str().into());
    obj.insert("base_address", hex(periph.base_address));
    obj.insert(
        "group_name",
        periph
            .group_name
            .as_deref()
            .map_or(JsonValue::Null, JsonValue::from),
    );
    obj.insert(
        "registers",
        JsonValue::Array(periph.registers.iter().map(register_to_json).collect()),
    );
    JsonValue::Object(obj)
}

/// Convert `device` into the JSON descriptor format
pub(crate) fn device_to_json(device: &Device) -> JsonValue {
    JsonValue::Array(device.peripherals.iter().map(peripheral_to_json).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::SvdParseError, model::NO_DESCRIPTION};

    const UART: &str = r##"[
  {
    "name": "UART0",
    "base_address": "0x40002000",
    "registers": [
      {
        "name": "STATUS",
        "description": "Status\n  register",
        "access": "read-only",
        "address_offset": 4,
        "fields": [
          {
            "name": "STATE",
            "lsb": 0,
            "msb": 1,
            "enums": [
              { "value": 0, "name": "IDLE" },
              { "value": "#10", "name": "BUSY", "description": "Transfer ongoing" }
            ]
          }
        ]
      },
      {
        "name": "DATA",
        "access": "read-write",
        "address_offset": "0x0",
        "fields": [{ "name": "BYTE", "lsb": 0, "msb": 7, "access": "write-only" }]
      }
    ]
  },
  {
    "name": "GPIO",
    "description": "General purpose I/O",
    "group_name": "GPIO",
    "base_address": 1073745920,
    "registers": []
  }
]"##;

    #[test]
    fn parses_nested_descriptors() {
        let dev = parse_json_str(UART, "uart", ValidateLevel::Strict).unwrap();
        assert_eq!(dev.name, "uart");
        assert_eq!(dev.peripherals[0].name, "GPIO");
        assert_eq!(dev.peripherals[0].base_address, 0x4000_1000);
        assert_eq!(dev.peripherals[0].group_name.as_deref(), Some("GPIO"));

        let uart = dev.peripheral("UART0").unwrap();
        assert_eq!(uart.description, NO_DESCRIPTION);
        assert_eq!(uart.registers[0].name, "DATA");

        let status = uart.register("STATUS").unwrap();
        assert_eq!(status.description, "Status register");
        let state = status.field("STATE").unwrap();
        assert_eq!(state.access, Access::ReadOnly);
        assert_eq!(state.enums[1].value, 2);
        assert_eq!(state.enums[1].description, "Transfer ongoing");
        assert_eq!(
            uart.register("DATA").unwrap().fields[0].access,
            Access::WriteOnly
        );
    }

    #[test]
    fn emitted_json_parses_back() {
        let dev = parse_json_str(UART, "uart", ValidateLevel::Strict).unwrap();
        let text = device_to_json(&dev).pretty(2);
        assert!(text.contains(r#""0x40002000""#), "{text}");
        let again = parse_json_str(&text, "uart", ValidateLevel::Strict).unwrap();
        assert_eq!(again, dev);
    }

    #[test]
    fn reports_structural_errors() {
        assert!(matches!(
            parse_json_str("{}", "x", ValidateLevel::Weak),
            Err(JsonParseError::ExpectedArray(_))
        ));
        assert!(matches!(
            parse_json_str("[1]", "x", ValidateLevel::Weak),
            Err(JsonParseError::ExpectedObject(_))
        ));
        assert!(matches!(
            parse_json_str(r#"[{"name": "P"}]"#, "x", ValidateLevel::Weak),
            Err(JsonParseError::FieldNotFound(f)) if f == "base_address"
        ));
        assert!(matches!(
            parse_json_str(r#"[{"name": 3, "base_address": 0}]"#, "x", ValidateLevel::Weak),
            Err(JsonParseError::UnexpectedType { expected: "string", .. })
        ));
        assert!(matches!(
            parse_json_str(r#"[{"name": "P", "base_address": "0xZZ"}]"#, "x", ValidateLevel::Weak),
            Err(JsonParseError::Invalid(SvdParseError::InvalidNonnegInt(_)))
        ));
        assert!(matches!(
            parse_json_str("[", "x", ValidateLevel::Weak),
            Err(JsonParseError::Json(_))
        ));
    }

    #[test]
    fn bit_range_and_validation() {
        let reversed = r#"[{"name": "P", "base_address": 0, "registers": [
            {"name": "R", "access": "read-write", "address_offset": 0,
             "fields": [{"name": "F", "lsb": 4, "msb": 3}]}]}]"#;
        assert!(matches!(
            parse_json_str(reversed, "x", ValidateLevel::Disabled),
            Err(JsonParseError::GenericParse(_))
        ));

        let overlapping = r#"[{"name": "P", "base_address": 0, "registers": [
            {"name": "R", "access": "read-write", "address_offset": 0,
             "fields": [{"name": "A", "lsb": 0, "msb": 3}, {"name": "B", "lsb": 2, "msb": 5}]}]}]"#;
        assert!(matches!(
            parse_json_str(overlapping, "x", ValidateLevel::Strict),
            Err(JsonParseError::Invalid(SvdParseError::OverlappingFields(..)))
        ));
        assert!(parse_json_str(overlapping, "x", ValidateLevel::Weak).is_ok());
    }
}
