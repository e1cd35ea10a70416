use std::{fmt, rc::Rc};

use crate::{
    access::RegisterAccess,
    error::{ModelError, RangeError},
    model::{AddrRepr, RegisterDescriptor, ADDR_BITS},
    num_field::{DisplayBase, NumField, Step},
    value::{FieldModel, REGISTER_BIT_WIDTH},
};
use log::debug;

/// Value of a register together with the values of its bit-fields
///
/// Every completed update leaves each field equal to the bits it covers in the register value.
/// Updates flow one way per call: a register update is pushed down into all fields and a field
/// update is merged into the register with a read-modify-write.
///
/// With auto-write enabled, each completed update emits exactly one write request of the full
/// register value to the connected [`RegisterAccess`].
pub struct RegisterModel {
    descriptor: RegisterDescriptor,
    address: AddrRepr,
    value: NumField,
    fields: Vec<FieldModel>,
    auto_write: bool,
    access: Option<Rc<dyn RegisterAccess>>,
}

impl RegisterModel {
    /// Build the model of `descriptor` for a peripheral at `base`
    ///
    /// # Errors
    ///
    /// * A field does not fit in [`REGISTER_BIT_WIDTH`] bits
    /// * The absolute address of the register does not fit in the address space
    pub fn new(descriptor: &RegisterDescriptor, base: u64) -> Result<Self, ModelError> {
        let address = AddrRepr::from_base_offset(base, descriptor.address_offset, ADDR_BITS)
            .map_err(|e| e.with_id(descriptor.name.clone()))?;

        if let Some(field) = descriptor
            .fields
            .iter()
            .find(|f| f.bit_range.msb() >= REGISTER_BIT_WIDTH)
        {
            return Err(ModelError::FieldOutOfRegister {
                reg: descriptor.name.clone(),
                field: field.name.clone(),
                bits: field.bit_range.to_string(),
                width: REGISTER_BIT_WIDTH,
            });
        }

        let fields = descriptor
            .fields
            .iter()
            .cloned()
            .map(FieldModel::new)
            .collect();

        Ok(Self {
            descriptor: descriptor.clone(),
            address,
            value: NumField::new(REGISTER_BIT_WIDTH),
            fields,
            auto_write: false,
            access: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &RegisterDescriptor {
        &self.descriptor
    }

    /// Absolute address of the register
    pub fn address(&self) -> u64 {
        self.address.full()
    }

    /// Address of the register, split into the components it was declared with
    pub fn addr_repr(&self) -> &AddrRepr {
        &self.address
    }

    pub fn get_value(&self) -> u64 {
        self.value.get()
    }

    pub fn num(&self) -> &NumField {
        &self.value
    }

    pub fn text(&self) -> String {
        self.value.text()
    }

    pub fn fields(&self) -> &[FieldModel] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldModel> {
        self.fields.iter().find(|f| f.name() == name)
    }

    pub fn get_field_value(&self, name: &str) -> Result<u64, ModelError> {
        Ok(self.fields[self.field_index(name)?].get())
    }

    /// Change the display base of the register value and of every field
    pub fn set_display_base(&mut self, base: DisplayBase) {
        self.value.set_display_base(base);
        for field in &mut self.fields {
            field.set_display_base(base);
        }
    }

    pub fn auto_write(&self) -> bool {
        self.auto_write
    }

    pub fn set_auto_write(&mut self, enable: bool) {
        self.auto_write = enable;
    }

    /// Attach the service that performs read and write requests
    pub fn connect(&mut self, access: Rc<dyn RegisterAccess>) {
        self.access = Some(access);
    }

    /// Set the register value and push it down into every field
    ///
    /// # Errors
    ///
    /// `value` does not fit in the register. Nothing is changed and nothing is written.
    pub fn set_value(&mut self, value: u64) -> Result<(), RangeError> {
        self.value.set_value(value)?;
        self.store(value);
        Ok(())
    }

    /// Parse `raw` in the display base of the register and set the result
    pub fn set_text(&mut self, raw: &str) -> Result<u64, ModelError> {
        let value = self.value.parse_text(raw)?;
        self.set_value(value)?;
        Ok(value)
    }

    /// Increment or decrement the register value, saturating at both ends
    ///
    /// Returns whether the value changed. Nothing is written when it did not.
    pub fn step(&mut self, step: Step) -> bool {
        match self.value.stepped(step) {
            Some(value) => {
                self.store(value);
                true
            }
            None => false,
        }
    }

    /// Set the value of the field `name` and merge it into the register
    ///
    /// # Errors
    ///
    /// * There is no field called `name`
    /// * `value` does not fit in the field. Nothing is changed and nothing is written.
    pub fn set_field_value(&mut self, name: &str, value: u64) -> Result<(), ModelError> {
        let idx = self.field_index(name)?;
        self.set_field_value_at(idx, value)
    }

    /// Parse `raw` in the display base of the field `name` and set the result
    pub fn set_field_text(&mut self, name: &str, raw: &str) -> Result<u64, ModelError> {
        let idx = self.field_index(name)?;
        let value = self.fields[idx].num().parse_text(raw)?;
        self.set_field_value_at(idx, value)?;
        Ok(value)
    }

    /// Set a field to one of its enumerated values, by position in the declaration
    pub fn select_field_enum(&mut self, name: &str, index: usize) -> Result<(), ModelError> {
        let idx = self.field_index(name)?;
        let value = self.fields[idx].enum_value(index)?;
        self.set_field_value_at(idx, value)?;
        // Several names may share one value
        self.fields[idx].select_enum(index)
    }

    /// Set a field from a toggle, `true` meaning 1
    pub fn set_field_flag(&mut self, name: &str, on: bool) -> Result<(), ModelError> {
        self.set_field_value(name, u64::from(on))
    }

    /// Increment or decrement the field `name`, saturating at both ends of its range
    pub fn step_field(&mut self, name: &str, step: Step) -> Result<bool, ModelError> {
        let idx = self.field_index(name)?;
        match self.fields[idx].num().stepped(step) {
            Some(value) => {
                self.set_field_value_at(idx, value)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Request the full register value to be written
    ///
    /// # Errors
    ///
    /// * The register is not software writable
    /// * No [`RegisterAccess`] is connected
    pub fn write(&self) -> Result<(), ModelError> {
        if !self.descriptor.access.is_write() {
            return Err(ModelError::NotWritable(self.descriptor.name.clone()));
        }
        let access = self.connected()?;
        access.request_write(self.address(), self.get_value());
        Ok(())
    }

    /// Request the current value of the register
    ///
    /// The result is expected back through [`RegisterModel::set_value`].
    pub fn request_read(&self) -> Result<(), ModelError> {
        if !self.descriptor.access.is_read() {
            return Err(ModelError::NotReadable(self.descriptor.name.clone()));
        }
        let access = self.connected()?;
        access.request_read(self.address());
        Ok(())
    }

    /// Whether every field equals the bits it covers in the register value
    pub fn is_consistent(&self) -> bool {
        let reg = self.get_value();
        self.fields
            .iter()
            .all(|f| f.get() == f.bit_range().extract(reg))
    }

    fn field_index(&self, name: &str) -> Result<usize, ModelError> {
        self.fields
            .iter()
            .position(|f| f.name() == name)
            .ok_or_else(|| ModelError::UnknownField {
                reg: self.descriptor.name.clone(),
                field: name.to_owned(),
            })
    }

    fn connected(&self) -> Result<&Rc<dyn RegisterAccess>, ModelError> {
        self.access
            .as_ref()
            .ok_or_else(|| ModelError::NotConnected(self.descriptor.name.clone()))
    }

    /// `value` must fit in the register
    fn store(&mut self, value: u64) {
        self.value.set_masked(value);
        for field in &mut self.fields {
            field.derive_from(value);
        }
        debug_assert!(self.is_consistent());
        self.write_if_auto();
    }

    fn set_field_value_at(&mut self, idx: usize, value: u64) -> Result<(), ModelError> {
        // Range check on the field comes first so that a rejected value changes nothing
        self.fields[idx].set_value(value)?;
        let range = self.fields[idx].bit_range();
        let reg = range.deposit(self.get_value(), value);
        self.value.set_masked(reg);

        // Fields that share no bits with the edited one cannot have changed
        for (i, sibling) in self.fields.iter_mut().enumerate() {
            if i != idx && sibling.bit_range().overlaps(&range) {
                sibling.derive_from(reg);
            }
        }
        debug_assert!(self.is_consistent());
        self.write_if_auto();
        Ok(())
    }

    fn write_if_auto(&self) {
        if !self.auto_write {
            return;
        }
        if !self.descriptor.access.is_write() {
            debug!(
                "auto-write skipped: register {} is {}",
                self.descriptor.name, self.descriptor.access
            );
            return;
        }
        match &self.access {
            Some(access) => access.request_write(self.address(), self.get_value()),
            None => debug!(
                "auto-write skipped: register {} is not connected",
                self.descriptor.name
            ),
        }
    }
}

impl fmt::Debug for RegisterModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterModel")
            .field("name", &self.descriptor.name)
            .field("address", &self.address)
            .field("value", &self.value.get())
            .field("fields", &self.fields)
            .field("auto_write", &self.auto_write)
            .field("connected", &self.access.is_some())
            .finish()
    }
}

impl fmt::Display for RegisterModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.descriptor.name, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        access::{AccessRequest, RequestLog},
        model::{Access, BitRange, EnumValue, FieldDescriptor, NO_DESCRIPTION},
    };

    const BASE: u64 = 0x4000_1000;

    fn field(name: &str, lsb: u32, msb: u32) -> FieldDescriptor {
        FieldDescriptor {
            name: name.to_owned(),
            description: NO_DESCRIPTION.to_owned(),
            bit_range: BitRange::new(lsb, msb).unwrap(),
            access: Access::ReadWrite,
            enums: vec![],
        }
    }

    fn descriptor(access: Access, fields: Vec<FieldDescriptor>) -> RegisterDescriptor {
        RegisterDescriptor {
            name: "CTRL".to_owned(),
            description: NO_DESCRIPTION.to_owned(),
            address_offset: 0x8,
            access,
            fields,
        }
    }

    /// A = [3:0], B = [7:4]
    fn ctrl() -> RegisterModel {
        RegisterModel::new(
            &descriptor(
                Access::ReadWrite,
                vec![field("A", 0, 3), field("B", 4, 7)],
            ),
            BASE,
        )
        .unwrap()
    }

    fn connected(mut reg: RegisterModel) -> (RegisterModel, Rc<RequestLog>) {
        let log = Rc::new(RequestLog::new());
        reg.connect(log.clone());
        (reg, log)
    }

    #[test]
    fn register_value_flows_into_fields() {
        let mut reg = ctrl();
        reg.set_value(0xA5).unwrap();
        assert_eq!(reg.get_field_value("A"), Ok(0x5));
        assert_eq!(reg.get_field_value("B"), Ok(0xA));
        assert!(reg.is_consistent());
    }

    #[test]
    fn field_value_flows_into_register() {
        let mut reg = ctrl();
        reg.set_value(0xA5).unwrap();
        reg.set_field_value("B", 0x3).unwrap();
        assert_eq!(reg.get_value(), 0x35);
        assert_eq!(reg.get_field_value("A"), Ok(0x5));
        assert!(reg.is_consistent());
    }

    #[test]
    fn field_update_preserves_bits_outside_the_field() {
        let mut reg = ctrl();
        reg.set_value(0xdead_beef).unwrap();
        reg.set_field_value("A", 0x0).unwrap();
        assert_eq!(reg.get_value(), 0xdead_bee0);
    }

    #[test]
    fn out_of_range_values_change_nothing() {
        let (mut reg, log) = connected(ctrl());
        reg.set_auto_write(true);
        reg.set_value(0x12).unwrap();
        log.take();

        assert_eq!(
            reg.set_value(1 << 32),
            Err(RangeError {
                value: 1 << 32,
                bit_width: 32
            })
        );
        assert!(matches!(
            reg.set_field_value("A", 0x10),
            Err(ModelError::Range(_))
        ));
        assert_eq!(reg.get_value(), 0x12);
        assert_eq!(reg.get_field_value("A"), Ok(0x2));
        assert!(log.requests().is_empty());
    }

    #[test]
    fn unknown_field_is_an_error() {
        let mut reg = ctrl();
        assert_eq!(
            reg.set_field_value("Z", 0),
            Err(ModelError::UnknownField {
                reg: "CTRL".to_owned(),
                field: "Z".to_owned()
            })
        );
        assert!(reg.get_field_value("Z").is_err());
    }

    #[test]
    fn field_outside_register_is_rejected() {
        let err = RegisterModel::new(
            &descriptor(Access::ReadWrite, vec![field("WIDE", 28, 35)]),
            BASE,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ModelError::FieldOutOfRegister {
                reg: "CTRL".to_owned(),
                field: "WIDE".to_owned(),
                bits: "[35:28]".to_owned(),
                width: 32,
            }
        );
    }

    #[test]
    fn address_overflow_is_rejected() {
        assert!(matches!(
            RegisterModel::new(&descriptor(Access::ReadWrite, vec![]), 0xffff_fffc),
            Err(ModelError::AddrOverflow(_))
        ));
    }

    #[test]
    fn auto_write_emits_one_write_per_update() {
        let (mut reg, log) = connected(ctrl());
        reg.set_value(0x1).unwrap();
        assert!(log.requests().is_empty());

        reg.set_auto_write(true);
        reg.set_value(0xA5).unwrap();
        reg.set_field_value("B", 0x3).unwrap();
        assert!(reg.step(Step::Up));
        assert_eq!(
            log.take(),
            vec![
                AccessRequest::Write {
                    address: BASE + 0x8,
                    value: 0xA5
                },
                AccessRequest::Write {
                    address: BASE + 0x8,
                    value: 0x35
                },
                AccessRequest::Write {
                    address: BASE + 0x8,
                    value: 0x36
                },
            ]
        );
    }

    #[test]
    fn auto_write_skips_read_only_registers() {
        let reg = RegisterModel::new(
            &descriptor(Access::ReadOnly, vec![field("A", 0, 3)]),
            BASE,
        )
        .unwrap();
        let (mut reg, log) = connected(reg);
        reg.set_auto_write(true);
        reg.set_value(0x5).unwrap();
        reg.set_field_value("A", 0x7).unwrap();
        assert_eq!(reg.get_value(), 0x7);
        assert!(log.requests().is_empty());
        assert_eq!(reg.write(), Err(ModelError::NotWritable("CTRL".to_owned())));
    }

    #[test]
    fn explicit_write_and_read_need_a_connection() {
        let mut reg = ctrl();
        reg.set_value(0x42).unwrap();
        assert_eq!(reg.write(), Err(ModelError::NotConnected("CTRL".to_owned())));
        assert_eq!(
            reg.request_read(),
            Err(ModelError::NotConnected("CTRL".to_owned()))
        );

        let (reg, log) = connected(reg);
        reg.write().unwrap();
        reg.request_read().unwrap();
        assert_eq!(
            log.requests(),
            vec![
                AccessRequest::Write {
                    address: BASE + 0x8,
                    value: 0x42
                },
                AccessRequest::Read {
                    address: BASE + 0x8
                },
            ]
        );
    }

    #[test]
    fn overlapping_siblings_are_rederived() {
        let mut reg = RegisterModel::new(
            &descriptor(
                Access::ReadWrite,
                vec![field("LOW", 0, 3), field("MID", 2, 5), field("HIGH", 6, 7)],
            ),
            BASE,
        )
        .unwrap();
        reg.set_value(0xff).unwrap();
        reg.set_field_value("LOW", 0x0).unwrap();
        assert_eq!(reg.get_value(), 0xf0);
        assert_eq!(reg.get_field_value("MID"), Ok(0xc));
        assert_eq!(reg.get_field_value("HIGH"), Ok(0x3));
        assert!(reg.is_consistent());
    }

    #[test]
    fn text_edits_use_the_display_base() {
        let mut reg = ctrl();
        assert_eq!(reg.text(), "0x00000000");
        reg.set_text("0x000000a5").unwrap();
        assert_eq!(reg.get_field_value("B"), Ok(0xA));

        reg.set_display_base(DisplayBase::Binary);
        reg.set_field_text("A", "0011").unwrap();
        assert_eq!(reg.get_value(), 0xA3);
        assert!(matches!(
            reg.set_field_text("A", "0x3"),
            Err(ModelError::Format(_))
        ));
        assert_eq!(reg.field("B").unwrap().text(), "1010");
    }

    #[test]
    fn enums_and_toggles_merge_into_register() {
        let mut mode = field("MODE", 4, 5);
        mode.enums = vec![
            EnumValue {
                value: 0,
                name: "SLOW".to_owned(),
                description: NO_DESCRIPTION.to_owned(),
            },
            EnumValue {
                value: 2,
                name: "FAST".to_owned(),
                description: NO_DESCRIPTION.to_owned(),
            },
        ];
        let mut reg = RegisterModel::new(
            &descriptor(Access::ReadWrite, vec![field("EN", 0, 0), mode]),
            BASE,
        )
        .unwrap();

        reg.select_field_enum("MODE", 1).unwrap();
        reg.set_field_flag("EN", true).unwrap();
        assert_eq!(reg.get_value(), 0x21);
        assert_eq!(
            reg.field("MODE").unwrap().selected_enum().map(|e| e.name.as_str()),
            Some("FAST")
        );

        reg.set_value(0x30).unwrap();
        assert_eq!(reg.field("MODE").unwrap().selected_enum(), None);
        assert!(!reg.field("EN").unwrap().is_set());
        assert!(matches!(
            reg.select_field_enum("MODE", 5),
            Err(ModelError::UnknownEnum { .. })
        ));
    }

    #[test]
    fn field_steps_saturate() {
        let mut reg = ctrl();
        reg.set_field_value("A", 0xf).unwrap();
        assert_eq!(reg.step_field("A", Step::Up), Ok(false));
        assert_eq!(reg.get_value(), 0x0f);
        assert_eq!(reg.step_field("B", Step::Down), Ok(false));
        assert_eq!(reg.step_field("B", Step::Up), Ok(true));
        assert_eq!(reg.get_value(), 0x1f);

        reg.set_value(u64::from(u32::MAX)).unwrap();
        assert!(!reg.step(Step::Up));
        assert_eq!(reg.get_value(), u64::from(u32::MAX));
    }
}
