//! Register model of the ILPS22QS on an I2C bus.

use embedded_hal::i2c::{self, ErrorKind, I2c, NoAcknowledgeSource, Operation, SevenBitAddress};
use log::trace;

use stpms_core::sensors::CHIP_ID;
use stpms_core::sensors::registers::{PressureScale, Register, control2};
use stpms_core::transport::DEFAULT_I2C_ADDRESS;

const REGISTER_COUNT: usize = 128;

/// STATUS bits for fresh pressure and temperature.
const STATUS_DATA_READY: u8 = 0b0000_0011;

// ---------------------------------------------------------------------------
// Tire model
// ---------------------------------------------------------------------------

/// Synthetic tire: pressure and temperature drifting slowly as it warms up.
#[derive(Debug, Clone, Copy)]
pub struct TireModel {
    /// Simulated seconds since the model started.
    elapsed_secs: f64,
    step_secs: f64,
}

impl TireModel {
    pub fn new(step_secs: u16) -> Self {
        Self {
            elapsed_secs: 0.0,
            step_secs: f64::from(step_secs),
        }
    }

    /// Advance by one measure period and return (mbar, centi-degrees).
    pub fn next_sample(&mut self) -> (f64, i16) {
        self.elapsed_secs += self.step_secs;
        let t = self.elapsed_secs;

        // Pressure: ~3200 mbar, rising a little with temperature
        let pressure = 3200.0 + 120.0 * (t / 900.0).sin() + 15.0 * (t / 47.0).cos();

        // Temperature: 15–35 °C over a long cycle
        let temperature = 2500.0 + 1000.0 * (t / 1800.0).sin() + 50.0 * (t / 61.0).cos();

        (pressure, temperature as i16)
    }
}

// ---------------------------------------------------------------------------
// Chip
// ---------------------------------------------------------------------------

/// Register file that converts on a one-shot trigger.
pub struct SimulatedChip {
    address: SevenBitAddress,
    regs: [u8; REGISTER_COUNT],
    pointer: u8,
    model: TireModel,
    absent: bool,
    never_ready: bool,
    temperature_nack: bool,
    conversions: u32,
}

impl SimulatedChip {
    pub fn new(model: TireModel) -> Self {
        let mut regs = [0; REGISTER_COUNT];
        regs[Register::WhoAmI.addr() as usize] = CHIP_ID;
        Self {
            address: DEFAULT_I2C_ADDRESS,
            regs,
            pointer: 0,
            model,
            absent: false,
            never_ready: false,
            temperature_nack: false,
            conversions: 0,
        }
    }

    /// Nothing answers on the bus.
    pub fn absent(mut self) -> Self {
        self.absent = true;
        self
    }

    /// Conversions start but STATUS never reports data.
    pub fn never_ready(mut self) -> Self {
        self.never_ready = true;
        self
    }

    /// Reads of the temperature output registers are not acknowledged.
    pub fn temperature_nack(mut self) -> Self {
        self.temperature_nack = true;
        self
    }

    pub fn register(&self, register: Register) -> u8 {
        self.regs[register.addr() as usize]
    }

    pub fn conversions(&self) -> u32 {
        self.conversions
    }

    pub fn model(&self) -> TireModel {
        self.model
    }

    fn write_register(&mut self, address: u8, value: u8) {
        let index = address as usize % REGISTER_COUNT;
        if address == Register::WhoAmI.addr() {
            return;
        }
        self.regs[index] = value;

        if address == Register::Control2.addr() && value & control2::ONE_SHOT != 0 {
            self.convert();
        }
    }

    fn convert(&mut self) {
        let control = self.register(Register::Control2);
        let scale = if control & control2::FULL_SCALE != 0 {
            PressureScale::High
        } else {
            PressureScale::Low
        };

        let (mbar, centi) = self.model.next_sample();
        let raw = (mbar * f64::from(scale.divisor())) as i32;
        let [_, high, mid, low] = raw.to_be_bytes();
        self.regs[Register::PressureOutLow.addr() as usize] = low;
        self.regs[Register::PressureOutMid.addr() as usize] = mid;
        self.regs[Register::PressureOutHigh.addr() as usize] = high;

        let [t_low, t_high] = centi.to_le_bytes();
        self.regs[Register::TemperatureOutLow.addr() as usize] = t_low;
        self.regs[Register::TemperatureOutHigh.addr() as usize] = t_high;

        // One-shot bit self-clears when the conversion ends
        self.regs[Register::Control2.addr() as usize] = control & !control2::ONE_SHOT;
        if !self.never_ready {
            self.regs[Register::Status.addr() as usize] = STATUS_DATA_READY;
        }
        self.conversions += 1;
        trace!("Chip converted {:.1} mbar, {} cC", mbar, centi);
    }

    fn read_register(&mut self, address: u8) -> Result<u8, ErrorKind> {
        let temperature_out =
            address == Register::TemperatureOutLow.addr() || address == Register::TemperatureOutHigh.addr();
        if self.temperature_nack && temperature_out {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data));
        }

        let value = self.regs[address as usize % REGISTER_COUNT];
        // Reading the last output byte consumes the sample
        if address == Register::TemperatureOutHigh.addr() {
            self.regs[Register::Status.addr() as usize] = 0;
        }
        Ok(value)
    }
}

impl i2c::ErrorType for SimulatedChip {
    type Error = ErrorKind;
}

impl I2c for SimulatedChip {
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if self.absent || address != self.address {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }

        for operation in operations {
            match operation {
                Operation::Write(bytes) => {
                    if let [register, data @ ..] = bytes {
                        self.pointer = *register;
                        for value in data {
                            self.write_register(self.pointer, *value);
                            self.pointer = self.pointer.wrapping_add(1);
                        }
                    }
                }
                Operation::Read(buffer) => {
                    for byte in buffer.iter_mut() {
                        *byte = self.read_register(self.pointer)?;
                        self.pointer = self.pointer.wrapping_add(1);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stpms_core::sensors::Ilps22qs;
    use stpms_core::sensors::registers::Average;
    use stpms_core::transport::I2cTransport;

    #[test]
    fn driver_reads_model_through_chip() {
        let chip = SimulatedChip::new(TireModel::new(30));
        let mut expected = chip.model();
        let (mbar, centi) = expected.next_sample();

        let mut sensor = Ilps22qs::new(I2cTransport::new(chip));
        sensor
            .start_one_shot_mode(None, PressureScale::High, Average::X16)
            .unwrap();
        sensor.trigger_one_shot().unwrap();
        sensor.wait_data_ready(3).unwrap();

        assert_eq!(sensor.pressure(), Ok(mbar as u16));
        assert_eq!(sensor.temperature(), Ok(centi));
        assert_eq!(sensor.release().release().conversions(), 1);
    }

    #[test]
    fn one_shot_bit_clears_after_conversion() {
        let mut chip = SimulatedChip::new(TireModel::new(5));
        chip.write(DEFAULT_I2C_ADDRESS, &[Register::Control2.addr(), control2::ONE_SHOT])
            .unwrap();
        assert_eq!(chip.register(Register::Control2) & control2::ONE_SHOT, 0);
        assert_eq!(chip.register(Register::Status), STATUS_DATA_READY);
    }

    #[test]
    fn absent_chip_nacks_address() {
        let mut chip = SimulatedChip::new(TireModel::new(5)).absent();
        let mut id = [0];
        assert_eq!(
            chip.write_read(DEFAULT_I2C_ADDRESS, &[Register::WhoAmI.addr()], &mut id),
            Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address))
        );
    }

    #[test]
    fn who_am_i_is_read_only() {
        let mut chip = SimulatedChip::new(TireModel::new(5));
        chip.write(DEFAULT_I2C_ADDRESS, &[Register::WhoAmI.addr(), 0x00])
            .unwrap();
        assert_eq!(chip.register(Register::WhoAmI), CHIP_ID);
    }
}
