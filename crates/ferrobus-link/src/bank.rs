//! In-memory point stores backing [`DeviceService`] for simulators and
//! tests.

use std::sync::RwLock;

use crate::slave::{DeviceService, PointError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoilBank {
    values: Vec<bool>,
}

impl CoilBank {
    pub fn new(size: usize) -> Self {
        Self {
            values: vec![false; size],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, address: u16) -> Result<bool, PointError> {
        self.values
            .get(usize::from(address))
            .copied()
            .ok_or(PointError::IllegalAddress)
    }

    pub fn set(&mut self, address: u16, value: bool) -> Result<(), PointError> {
        let slot = self
            .values
            .get_mut(usize::from(address))
            .ok_or(PointError::IllegalAddress)?;
        *slot = value;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterBank {
    values: Vec<u16>,
}

impl RegisterBank {
    pub fn new(size: usize) -> Self {
        Self {
            values: vec![0u16; size],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, address: u16) -> Result<u16, PointError> {
        self.values
            .get(usize::from(address))
            .copied()
            .ok_or(PointError::IllegalAddress)
    }

    pub fn set(&mut self, address: u16, value: u16) -> Result<(), PointError> {
        let slot = self
            .values
            .get_mut(usize::from(address))
            .ok_or(PointError::IllegalAddress)?;
        *slot = value;
        Ok(())
    }
}

#[derive(Debug)]
struct PointModel {
    coils: CoilBank,
    discrete_inputs: CoilBank,
    holding_registers: RegisterBank,
    input_registers: RegisterBank,
}

/// The four Modbus object spaces behind one lock.
///
/// Discrete inputs and input registers are read-only over the bus; the host
/// application feeds them through the setters.
#[derive(Debug)]
pub struct InMemoryDevice {
    model: RwLock<PointModel>,
}

impl InMemoryDevice {
    pub fn new(
        coil_count: usize,
        discrete_input_count: usize,
        holding_register_count: usize,
        input_register_count: usize,
    ) -> Self {
        Self {
            model: RwLock::new(PointModel {
                coils: CoilBank::new(coil_count),
                discrete_inputs: CoilBank::new(discrete_input_count),
                holding_registers: RegisterBank::new(holding_register_count),
                input_registers: RegisterBank::new(input_register_count),
            }),
        }
    }

    fn read<T>(&self, read: impl FnOnce(&PointModel) -> T) -> T {
        read(&self.model.read().expect("point model lock poisoned"))
    }

    fn write<T>(&self, write: impl FnOnce(&mut PointModel) -> T) -> T {
        write(&mut self.model.write().expect("point model lock poisoned"))
    }

    pub fn coil(&self, address: u16) -> Option<bool> {
        self.read(|m| m.coils.get(address).ok())
    }

    pub fn discrete_input(&self, address: u16) -> Option<bool> {
        self.read(|m| m.discrete_inputs.get(address).ok())
    }

    pub fn holding_register(&self, address: u16) -> Option<u16> {
        self.read(|m| m.holding_registers.get(address).ok())
    }

    pub fn input_register(&self, address: u16) -> Option<u16> {
        self.read(|m| m.input_registers.get(address).ok())
    }

    pub fn set_coil(&self, address: u16, value: bool) -> Result<(), PointError> {
        self.write(|m| m.coils.set(address, value))
    }

    pub fn set_discrete_input(&self, address: u16, value: bool) -> Result<(), PointError> {
        self.write(|m| m.discrete_inputs.set(address, value))
    }

    pub fn set_holding_register(&self, address: u16, value: u16) -> Result<(), PointError> {
        self.write(|m| m.holding_registers.set(address, value))
    }

    pub fn set_input_register(&self, address: u16, value: u16) -> Result<(), PointError> {
        self.write(|m| m.input_registers.set(address, value))
    }
}

impl DeviceService for InMemoryDevice {
    fn read_discrete(&self, address: u16) -> Result<bool, PointError> {
        self.read(|m| m.discrete_inputs.get(address))
    }

    fn read_coil(&self, address: u16) -> Result<bool, PointError> {
        self.read(|m| m.coils.get(address))
    }

    fn write_coil(&self, address: u16, value: bool) -> Result<(), PointError> {
        self.write(|m| m.coils.set(address, value))
    }

    fn read_input(&self, address: u16) -> Result<u16, PointError> {
        self.read(|m| m.input_registers.get(address))
    }

    fn read_holding(&self, address: u16) -> Result<u16, PointError> {
        self.read(|m| m.holding_registers.get(address))
    }

    fn write_holding(&self, address: u16, value: u16) -> Result<(), PointError> {
        self.write(|m| m.holding_registers.set(address, value))
    }
}

#[cfg(test)]
mod tests {
    use super::InMemoryDevice;
    use crate::slave::{DeviceService, PointError};

    #[test]
    fn banks_bound_their_address_space() {
        let device = InMemoryDevice::new(4, 4, 4, 4);
        assert_eq!(device.read_coil(3), Ok(false));
        assert_eq!(device.read_coil(4), Err(PointError::IllegalAddress));
        assert_eq!(device.write_holding(4, 1), Err(PointError::IllegalAddress));
    }

    #[test]
    fn writes_are_visible_to_reads() {
        let device = InMemoryDevice::new(4, 4, 4, 4);
        device.write_coil(1, true).unwrap();
        device.write_holding(2, 0xBEEF).unwrap();
        device.set_discrete_input(0, true).unwrap();
        device.set_input_register(3, 77).unwrap();

        assert_eq!(device.read_coil(1), Ok(true));
        assert_eq!(device.read_holding(2), Ok(0xBEEF));
        assert_eq!(device.read_discrete(0), Ok(true));
        assert_eq!(device.read_input(3), Ok(77));
    }
}
