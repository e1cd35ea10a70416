use crate::{
    error::{ModelError, RangeError},
    model::{BitRange, EnumValue, FieldDescriptor},
    num_field::{DisplayBase, NumField},
};

/// Value of a single bit-field
///
/// A field keeps track of which of its enumerated values, if any, matches the current value.
/// Setting a value that matches an enumerated value selects it, any other value clears the
/// selection.
#[derive(Clone, Debug)]
pub struct FieldModel {
    descriptor: FieldDescriptor,
    value: NumField,
    /// Index into `descriptor.enums`
    selected_enum: Option<usize>,
}

impl FieldModel {
    pub fn new(descriptor: FieldDescriptor) -> Self {
        let value = NumField::new(descriptor.bit_range.width());
        let mut field = Self {
            descriptor,
            value,
            selected_enum: None,
        };
        field.sync_enum();
        field
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &FieldDescriptor {
        &self.descriptor
    }

    pub fn bit_range(&self) -> BitRange {
        self.descriptor.bit_range
    }

    pub fn get(&self) -> u64 {
        self.value.get()
    }

    /// Number backing this field, e.g., for parsing text in the field's base
    pub fn num(&self) -> &NumField {
        &self.value
    }

    pub fn text(&self) -> String {
        self.value.text()
    }

    pub fn set_display_base(&mut self, base: DisplayBase) {
        self.value.set_display_base(base);
    }

    /// Set the value of this field only, without touching its register
    ///
    /// Use [`crate::RegisterModel::set_field_value`] to update the register as well.
    ///
    /// # Errors
    ///
    /// `value` does not fit in the bit width of the field.
    pub fn set_value(&mut self, value: u64) -> Result<(), RangeError> {
        self.value.set_value(value)?;
        self.sync_enum();
        Ok(())
    }

    /// Take on the bits of `reg` covered by this field
    pub(crate) fn derive_from(&mut self, reg: u64) {
        self.value.set_masked(self.bit_range().extract(reg));
        self.sync_enum();
    }

    /// Single-bit fields are presented as a toggle rather than as a number
    pub fn is_toggle(&self) -> bool {
        self.value.bit_width() == 1
    }

    pub fn is_set(&self) -> bool {
        self.get() != 0
    }

    pub fn enums(&self) -> &[EnumValue] {
        &self.descriptor.enums
    }

    pub fn selected_enum(&self) -> Option<&EnumValue> {
        self.selected_enum.map(|idx| &self.descriptor.enums[idx])
    }

    pub fn selected_enum_index(&self) -> Option<usize> {
        self.selected_enum
    }

    /// Value associated with the enumerated value at `index`
    pub(crate) fn enum_value(&self, index: usize) -> Result<u64, ModelError> {
        self.descriptor
            .enums
            .get(index)
            .map(|e| e.value)
            .ok_or_else(|| ModelError::UnknownEnum {
                field: self.descriptor.name.clone(),
                index,
            })
    }

    /// Select the enumerated value at `index` and take on its value
    pub fn select_enum(&mut self, index: usize) -> Result<(), ModelError> {
        let value = self.enum_value(index)?;
        self.set_value(value)?;
        self.selected_enum = Some(index);
        Ok(())
    }

    fn sync_enum(&mut self) {
        let value = self.get();
        // Keep the current selection if it still matches, e.g., when two names share a value
        if self.selected_enum().map(|e| e.value) == Some(value) {
            return;
        }
        self.selected_enum = self.descriptor.enums.iter().position(|e| e.value == value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Access, NO_DESCRIPTION};

    fn enum_value(value: u64, name: &str) -> EnumValue {
        EnumValue {
            value,
            name: name.to_owned(),
            description: NO_DESCRIPTION.to_owned(),
        }
    }

    fn field(lsb: u32, msb: u32, enums: Vec<EnumValue>) -> FieldModel {
        FieldModel::new(FieldDescriptor {
            name: "MODE".to_owned(),
            description: NO_DESCRIPTION.to_owned(),
            bit_range: BitRange::new(lsb, msb).unwrap(),
            access: Access::ReadWrite,
            enums,
        })
    }

    #[test]
    fn setting_value_follows_enums() {
        let mut f = field(0, 1, vec![enum_value(1, "W"), enum_value(2, "X")]);
        assert_eq!(f.selected_enum(), None);

        f.set_value(2).unwrap();
        assert_eq!(f.selected_enum().map(|e| e.name.as_str()), Some("X"));
        assert_eq!(f.selected_enum_index(), Some(1));

        f.set_value(3).unwrap();
        assert_eq!(f.selected_enum(), None);
        assert_eq!(f.get(), 3);
    }

    #[test]
    fn selecting_enum_sets_value() {
        let mut f = field(4, 6, vec![enum_value(0, "OFF"), enum_value(5, "FAST")]);
        // The initial zero matches the first enumerated value
        assert_eq!(f.selected_enum_index(), Some(0));

        f.select_enum(1).unwrap();
        assert_eq!(f.get(), 5);
        assert_eq!(f.selected_enum_index(), Some(1));

        assert_eq!(
            f.select_enum(2),
            Err(ModelError::UnknownEnum {
                field: "MODE".to_owned(),
                index: 2
            })
        );
        assert_eq!(f.get(), 5);
    }

    #[test]
    fn aliased_enum_keeps_its_selection() {
        let mut f = field(0, 1, vec![enum_value(1, "ON"), enum_value(1, "ENABLED")]);
        f.select_enum(1).unwrap();
        assert_eq!(f.selected_enum_index(), Some(1));
        f.set_value(1).unwrap();
        assert_eq!(f.selected_enum_index(), Some(1));
        f.set_value(0).unwrap();
        f.set_value(1).unwrap();
        assert_eq!(f.selected_enum_index(), Some(0));
    }

    #[test]
    fn enum_wider_than_field_is_rejected() {
        let mut f = field(0, 0, vec![enum_value(2, "TOO_WIDE")]);
        assert!(matches!(f.select_enum(0), Err(ModelError::Range(_))));
        assert_eq!(f.get(), 0);
    }

    #[test]
    fn single_bit_field_is_a_toggle() {
        let mut f = field(7, 7, vec![]);
        assert!(f.is_toggle());
        assert!(!f.is_set());
        f.set_value(1).unwrap();
        assert!(f.is_set());
        assert!(f.set_value(2).is_err());
        assert!(!field(0, 1, vec![]).is_toggle());
    }
}
