//! Drivers for the parts hanging off the RP2040: three DAC8568 octal DACs for
//! the CVs, an MCP23017 for the gates and triggers, a second MCP23017 for the
//! autotune routing mux, a 24LC256 EEPROM, and the control mux ADC.
//!
//! These are written against the `embedded-hal` traits so the board bring-up
//! in `main.rs` is the only place that names RP2040 types.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{self, I2c};
use embedded_hal::spi::{self, SpiDevice};
use embedded_hal_0_2::adc::{Channel, OneShot};

use polycv::controls::AnalogInput;
use polycv::outputs::{CvChannel, CvSink, GateLatch, OscRouter};
use polycv::storage::NvStorage;

/// Something went wrong talking to the board
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoardError {
    /// A DAC write failed
    Spi(spi::ErrorKind),
    /// An I2C transfer failed
    I2c(i2c::ErrorKind),
    /// The ADC didn't give a reading
    Adc,
    /// There's no such output on the board
    Channel(CvChannel),
}

fn spi_error<E: spi::Error>(e: E) -> BoardError {
    BoardError::Spi(e.kind())
}

fn i2c_error<E: i2c::Error>(e: E) -> BoardError {
    BoardError::I2c(e.kind())
}

/// A TI DAC8568 (8 channels, 16 bits).  Each write is a 32 bit frame, sent as
/// two 16 bit words in SPI mode 1.
pub struct Dac8568<SPI> {
    spi: SPI,
}

impl<SPI: SpiDevice<u16>> Dac8568<SPI> {
    const WRITE_UPDATE: u32 = 0x3;
    const INTERNAL_REF_ON: u32 = 0x0800_0001;

    /// Wrap the DAC and switch on its internal reference
    pub fn new(spi: SPI) -> Result<Self, BoardError> {
        let mut dac = Self { spi };
        dac.frame(Self::INTERNAL_REF_ON)?;
        Ok(dac)
    }
    fn frame(&mut self, frame: u32) -> Result<(), BoardError> {
        self.spi
            .write(&[(frame >> 16) as u16, frame as u16])
            .map_err(spi_error)
    }
    /// Write and update one channel
    pub fn write(&mut self, channel: u8, code: u16) -> Result<(), BoardError> {
        let frame = (Self::WRITE_UPDATE << 24) | ((channel as u32 & 0xF) << 20) | ((code as u32) << 4);
        self.frame(frame)
    }
}

/// A Microchip MCP23017 with both ports as outputs
pub struct Mcp23017<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> Mcp23017<I2C> {
    const IODIRA: u8 = 0x00;
    const OLATA: u8 = 0x14;

    /// Set up the expander at `address` with every pin an output at `idle`
    pub fn new(i2c: I2C, address: u8, idle: (u8, u8)) -> Result<Self, BoardError> {
        let mut expander = Self { i2c, address };
        expander.write_ports(idle.0, idle.1)?;
        expander
            .i2c
            .write(address, &[Self::IODIRA, 0x00, 0x00])
            .map_err(i2c_error)?;
        Ok(expander)
    }
    /// Latch new levels onto both ports at once
    pub fn write_ports(&mut self, a: u8, b: u8) -> Result<(), BoardError> {
        self.i2c
            .write(self.address, &[Self::OLATA, a, b])
            .map_err(i2c_error)
    }
}

/// The CV, gate, and trigger outputs
pub struct CvOutputs<SPI, I2C> {
    notes: Dac8568<SPI>,
    velocities: Dac8568<SPI>,
    modulation: Dac8568<SPI>,
    gates: Mcp23017<I2C>,
}

impl<SPI: SpiDevice<u16>, I2C: I2c> CvOutputs<SPI, I2C> {
    /// Gather up the output drivers
    pub fn new(
        notes: Dac8568<SPI>,
        velocities: Dac8568<SPI>,
        modulation: Dac8568<SPI>,
        gates: Mcp23017<I2C>,
    ) -> Self {
        Self {
            notes,
            velocities,
            modulation,
            gates,
        }
    }
}

impl<SPI: SpiDevice<u16>, I2C: I2c> CvSink for CvOutputs<SPI, I2C> {
    type Error = BoardError;
    fn set_cv(&mut self, channel: CvChannel, code: u16) -> Result<(), BoardError> {
        match channel {
            CvChannel::Note(v) if v < 8 => self.notes.write(v as u8, code),
            CvChannel::Velocity(v) if v < 8 => self.velocities.write(v as u8, code),
            CvChannel::Fm => self.modulation.write(0, code),
            CvChannel::Tm => self.modulation.write(1, code),
            _ => Err(BoardError::Channel(channel)),
        }
    }
    fn set_gates(&mut self, latch: GateLatch) -> Result<(), BoardError> {
        self.gates.write_ports(latch.gates, latch.triggers)
    }
}

/// The 16 channel autotune mux, driven from port A of an expander: bits 0-3
/// select, bit 4 is the active low enable
pub struct RouteMux<I2C> {
    expander: Mcp23017<I2C>,
}

impl<I2C: I2c> RouteMux<I2C> {
    const DISABLE: u8 = 0x10;

    /// Set up the expander with the mux disabled
    pub fn new(i2c: I2C, address: u8) -> Result<Self, BoardError> {
        Ok(Self {
            expander: Mcp23017::new(i2c, address, (Self::DISABLE, 0))?,
        })
    }
}

impl<I2C: I2c> OscRouter for RouteMux<I2C> {
    type Error = BoardError;
    fn route(&mut self, osc: Option<usize>) -> Result<(), BoardError> {
        let port = match osc {
            Some(osc) if osc < 16 => osc as u8,
            _ => Self::DISABLE,
        };
        self.expander.write_ports(port, 0)
    }
}

/// A Microchip 24LC256 (32KiB) I2C EEPROM
pub struct Eeprom24<I2C, D> {
    i2c: I2C,
    delay: D,
    address: u8,
}

impl<I2C: I2c, D: DelayNs> Eeprom24<I2C, D> {
    const WRITE_CYCLE_MS: u32 = 5;

    /// Wrap the EEPROM at `address`
    pub fn new(i2c: I2C, delay: D, address: u8) -> Self {
        Self {
            i2c,
            delay,
            address,
        }
    }
}

impl<I2C: I2c, D: DelayNs> NvStorage for Eeprom24<I2C, D> {
    type Error = BoardError;
    fn read_byte(&mut self, address: u16) -> Result<u8, BoardError> {
        let mut value = [0u8];
        self.i2c
            .write_read(self.address, &address.to_be_bytes(), &mut value)
            .map_err(i2c_error)?;
        Ok(value[0])
    }
    fn write_byte(&mut self, address: u16, value: u8) -> Result<(), BoardError> {
        let [hi, lo] = address.to_be_bytes();
        self.i2c
            .write(self.address, &[hi, lo, value])
            .map_err(i2c_error)?;
        self.delay.delay_ms(Self::WRITE_CYCLE_MS);
        Ok(())
    }
}

/// The ADC channel on the control mux common line
pub struct ControlAdc<ADC, PIN> {
    adc: ADC,
    pin: PIN,
}

impl<ADC, PIN> ControlAdc<ADC, PIN> {
    /// Wrap the ADC and the pin it reads
    pub fn new(adc: ADC, pin: PIN) -> Self {
        Self { adc, pin }
    }
}

impl<ADC, PIN> AnalogInput for ControlAdc<ADC, PIN>
where
    ADC: OneShot<ADC, u16, PIN>,
    PIN: Channel<ADC>,
{
    type Error = BoardError;
    fn read(&mut self) -> Result<u16, BoardError> {
        self.adc.read(&mut self.pin).map_err(|_| BoardError::Adc)
    }
}
