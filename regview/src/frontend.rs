//! Readers and writers for the supported descriptor formats

pub(crate) mod json;
pub(crate) mod svd;

use crate::{error::SvdParseError, model::RegisterDescriptor};
use log::warn;

/// How strictly questionable input is treated
///
/// Applies to invalid access strings, overlapping fields and enumerated values that do not fit in
/// their field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ValidateLevel {
    /// Accept everything silently
    Disabled,
    /// Log a warning and carry on
    #[default]
    Weak,
    /// Reject the input
    Strict,
}

impl ValidateLevel {
    /// Escalate `err` according to this level
    pub(crate) fn check(self, err: SvdParseError) -> Result<(), SvdParseError> {
        match self {
            Self::Strict => Err(err),
            Self::Weak => {
                warn!("{err}");
                Ok(())
            }
            Self::Disabled => Ok(()),
        }
    }
}

/// Check the fields of `reg` for overlaps and for enumerated values that do not fit
pub(crate) fn validate_register(
    reg: &RegisterDescriptor,
    level: ValidateLevel,
) -> Result<(), SvdParseError> {
    if level == ValidateLevel::Disabled {
        return Ok(());
    }
    for (a, b) in reg.overlapping_fields() {
        level.check(SvdParseError::OverlappingFields(
            a.name.clone(),
            b.name.clone(),
            reg.name.clone(),
        ))?;
    }
    for field in &reg.fields {
        for e in field.enums_out_of_range() {
            level.check(SvdParseError::EnumOutOfRange {
                field: field.name.clone(),
                name: e.name.clone(),
                value: e.value,
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Access, BitRange, EnumValue, FieldDescriptor, NO_DESCRIPTION};

    fn reg(fields: Vec<(&str, u32, u32)>) -> RegisterDescriptor {
        RegisterDescriptor {
            name: "CFG".to_owned(),
            description: NO_DESCRIPTION.to_owned(),
            address_offset: 0,
            access: Access::ReadWrite,
            fields: fields
                .into_iter()
                .map(|(name, lsb, msb)| FieldDescriptor {
                    name: name.to_owned(),
                    description: NO_DESCRIPTION.to_owned(),
                    bit_range: BitRange::new(lsb, msb).unwrap(),
                    access: Access::ReadWrite,
                    enums: vec![],
                })
                .collect(),
        }
    }

    #[test]
    fn overlap_is_escalated_by_level() {
        let r = reg(vec![("A", 0, 3), ("B", 3, 4)]);
        assert_eq!(
            validate_register(&r, ValidateLevel::Strict),
            Err(SvdParseError::OverlappingFields(
                "A".to_owned(),
                "B".to_owned(),
                "CFG".to_owned()
            ))
        );
        assert_eq!(validate_register(&r, ValidateLevel::Weak), Ok(()));
        assert_eq!(validate_register(&r, ValidateLevel::Disabled), Ok(()));
        assert_eq!(
            validate_register(&reg(vec![("A", 0, 3), ("B", 4, 7)]), ValidateLevel::Strict),
            Ok(())
        );
    }

    #[test]
    fn wide_enum_is_escalated_by_level() {
        let mut r = reg(vec![("EN", 0, 0)]);
        r.fields[0].enums.push(EnumValue {
            value: 2,
            name: "MAYBE".to_owned(),
            description: NO_DESCRIPTION.to_owned(),
        });
        assert!(matches!(
            validate_register(&r, ValidateLevel::Strict),
            Err(SvdParseError::EnumOutOfRange { value: 2, .. })
        ));
        assert_eq!(validate_register(&r, ValidateLevel::Weak), Ok(()));
    }
}
