use std::rc::Rc;

use crate::{
    access::RegisterAccess,
    error::ModelError,
    model::PeripheralDescriptor,
    num_field::DisplayBase,
    value::RegisterModel,
};
use log::{debug, info};

/// Live values of all registers of one peripheral
#[derive(Debug)]
pub struct PeripheralModel {
    name: String,
    base_address: u64,
    registers: Vec<RegisterModel>,
}

impl PeripheralModel {
    pub fn new(descriptor: &PeripheralDescriptor) -> Result<Self, ModelError> {
        let registers = descriptor
            .registers
            .iter()
            .map(|reg| RegisterModel::new(reg, descriptor.base_address))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(
            "built peripheral {} at {:#010x} with {} registers",
            descriptor.name,
            descriptor.base_address,
            registers.len()
        );
        Ok(Self {
            name: descriptor.name.clone(),
            base_address: descriptor.base_address,
            registers,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_address(&self) -> u64 {
        self.base_address
    }

    pub fn registers(&self) -> &[RegisterModel] {
        &self.registers
    }

    pub fn register(&self, name: &str) -> Option<&RegisterModel> {
        self.registers.iter().find(|r| r.name() == name)
    }

    pub fn register_mut(&mut self, name: &str) -> Option<&mut RegisterModel> {
        self.registers.iter_mut().find(|r| r.name() == name)
    }

    /// Attach `access` to every register
    pub fn connect(&mut self, access: Rc<dyn RegisterAccess>) {
        for reg in &mut self.registers {
            reg.connect(access.clone());
        }
    }

    pub fn set_auto_write(&mut self, enable: bool) {
        for reg in &mut self.registers {
            reg.set_auto_write(enable);
        }
    }

    pub fn set_display_base(&mut self, base: DisplayBase) {
        for reg in &mut self.registers {
            reg.set_display_base(base);
        }
    }

    /// Request the value of every readable register
    ///
    /// Returns the number of read requests emitted.
    ///
    /// # Errors
    ///
    /// No [`RegisterAccess`] is connected.
    pub fn read_all(&self) -> Result<usize, ModelError> {
        let mut count = 0;
        for reg in &self.registers {
            if !reg.descriptor().access.is_read() {
                debug!("read skipped: register {} is {}", reg.name(), reg.descriptor().access);
                continue;
            }
            reg.request_read()?;
            count += 1;
        }
        info!("requested {count} register reads from {}", self.name);
        Ok(count)
    }

    /// Deliver the result of a read request to the register at absolute `address`
    pub fn apply_read_result(&mut self, address: u64, value: u64) -> Result<(), ModelError> {
        let reg = self
            .registers
            .iter_mut()
            .find(|r| r.address() == address)
            .ok_or_else(|| ModelError::UnknownAddress {
                periph: self.name.clone(),
                addr: address,
            })?;
        reg.set_value(value)?;
        Ok(())
    }
}
