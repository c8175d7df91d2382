use crate::fault::FaultFlags;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub value: f32,
    pub faults: FaultFlags,
}

impl Reading {
    pub fn new(value: f32, faults: FaultFlags) -> Self {
        Self { value, faults }
    }

    pub fn is_faulted(&self) -> bool {
        self.faults.is_faulted()
    }
}

/// RTD-to-digital converter. One call to `read_temperature` is one bounded
/// conversion cycle; the value is returned even when faults are latched.
pub trait SensorBridge {
    fn read_temperature(&mut self) -> Reading;
    fn clear_fault(&mut self);
}

impl<B: SensorBridge + ?Sized> SensorBridge for &mut B {
    fn read_temperature(&mut self) -> Reading {
        (**self).read_temperature()
    }

    fn clear_fault(&mut self) {
        (**self).clear_fault()
    }
}

impl<B: SensorBridge + ?Sized> SensorBridge for Box<B> {
    fn read_temperature(&mut self) -> Reading {
        (**self).read_temperature()
    }

    fn clear_fault(&mut self) {
        (**self).clear_fault()
    }
}
