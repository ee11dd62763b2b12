//! Driver for the MAX31855 cold-junction compensated K-thermocouple
//! converter.
//!
//! The chip is read-only: each bus transaction triggers a conversion, waits
//! out the conversion time (~9..10Hz sampling rate) and shifts a single
//! 32-bit frame out on the falling clock edge. Works over a hardware SPI bus
//! or by bit-banging the clock and data lines; both produce identical frames.
//! Chip select doubles as the conversion-control line, so the driver owns it
//! as a plain output pin instead of delegating it to the bus.

#![deny(unsafe_code)]
#![no_std]

pub mod frame;

pub use frame::{Fault, FrameError, RawFrame};

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::spi::{Mode, SpiBus, MODE_0};

#[cfg(test)]
#[macro_use]
extern crate std;

/// Power-up settling time before the first conversion is trustworthy.
pub const POWER_UP_TIME_MS: u32 = 200;
/// Time from triggering a conversion until its result is valid to read.
/// Reading earlier yields stale or partial data.
pub const CONVERSION_TIME_MS: u32 = 100;
/// Hold time for the chip-select pulse that aborts an in-flight conversion.
const CS_ABORT_PULSE_MS: u32 = 1;
/// Highest serial clock the chip is rated for.
pub const MAX_CLOCK_HZ: u32 = 5_000_000;
/// SPI mode for the peripheral transport (data is sampled on the falling
/// clock edge; the chip never drives the line on a rising edge).
pub const MODE: Mode = MODE_0;

/// Errors from acquiring and decoding a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E, P> {
    /// The frame transport failed.
    Transfer(E),
    /// The chip-select pin failed.
    ChipSelect(P),
    /// A reserved frame bit was non-zero; no genuine chip answered.
    Identity,
    /// The frame reported a thermocouple fault.
    Fault(Fault),
}

impl<E, P> From<FrameError> for Error<E, P> {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::Identity => Error::Identity,
            FrameError::Fault(f) => Error::Fault(f),
        }
    }
}

/// One synchronous 32-bit frame transfer, MSB first.
///
/// Implementations only shift bits; chip select and conversion timing stay
/// with the driver.
pub trait Transport {
    /// Transport-level error.
    type Error;

    /// Put the transport lines into their idle state. Called once during
    /// [`Max31855::begin`].
    fn init(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Shift 32 bits out of the device while chip select is held low.
    fn read_frame(&mut self) -> Result<u32, Self::Error>;
}

/// Frame transport over a dedicated SPI peripheral.
///
/// The bus must be configured by the caller for [`MODE`] at no more than
/// [`MAX_CLOCK_HZ`]. The chip has no MOSI line; whatever the bus clocks out
/// is ignored.
pub struct SpiTransport<SPI> {
    spi: SPI,
}

impl<SPI> SpiTransport<SPI>
where
    SPI: SpiBus,
{
    pub fn new(spi: SPI) -> Self {
        Self { spi }
    }
}

impl<SPI> Transport for SpiTransport<SPI>
where
    SPI: SpiBus,
{
    type Error = SPI::Error;

    fn read_frame(&mut self) -> Result<u32, Self::Error> {
        let mut buf = [0u8; 4];
        self.spi.read(&mut buf)?;
        // All 32 clocks must have happened before chip select rises.
        self.spi.flush()?;
        Ok(u32::from_be_bytes(buf))
    }
}

/// Error from one of the two bit-banged lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BitBangError<C, D> {
    /// The clock output pin failed.
    Clock(C),
    /// The data input pin failed.
    Data(D),
}

/// Frame transport that toggles the clock line in software.
///
/// Produces frames bit-identical to [`SpiTransport`]: the data line is
/// sampled once per clock cycle, between the rising and falling edge.
pub struct BitBang<SCK, SO> {
    sck: SCK,
    so: SO,
}

impl<SCK, SO> BitBang<SCK, SO>
where
    SCK: OutputPin,
    SO: InputPin,
{
    pub fn new(sck: SCK, so: SO) -> Self {
        Self { sck, so }
    }
}

impl<SCK, SO> Transport for BitBang<SCK, SO>
where
    SCK: OutputPin,
    SO: InputPin,
{
    type Error = BitBangError<SCK::Error, SO::Error>;

    fn init(&mut self) -> Result<(), Self::Error> {
        self.sck.set_low().map_err(BitBangError::Clock)
    }

    fn read_frame(&mut self) -> Result<u32, Self::Error> {
        let mut word = 0u32;
        for _ in 0..32 {
            self.sck.set_high().map_err(BitBangError::Clock)?;
            word <<= 1;
            if self.so.is_high().map_err(BitBangError::Data)? {
                word |= 1;
            }
            self.sck.set_low().map_err(BitBangError::Clock)?;
        }
        Ok(word)
    }
}

/// MAX31855 thermocouple-to-digital converter.
///
/// Owns its chip-select pin, frame transport and delay source exclusively;
/// separate instances on separate pins are independent. Every acquisition
/// blocks for the full conversion time, which caps the effective sampling
/// rate at ~10Hz.
pub struct Max31855<CS, T, D> {
    cs: CS,
    transport: T,
    delay: D,
}

impl<CS, SPI, D> Max31855<CS, SpiTransport<SPI>, D>
where
    CS: OutputPin,
    SPI: SpiBus,
    D: DelayNs,
{
    /// Driver over a hardware SPI bus plus a dedicated chip-select pin.
    pub fn new_spi(cs: CS, spi: SPI, delay: D) -> Self {
        Self::new(cs, SpiTransport::new(spi), delay)
    }
}

impl<CS, SCK, SO, D> Max31855<CS, BitBang<SCK, SO>, D>
where
    CS: OutputPin,
    SCK: OutputPin,
    SO: InputPin,
    D: DelayNs,
{
    /// Driver that bit-bangs the clock and data lines directly.
    pub fn new_bitbang(cs: CS, sck: SCK, so: SO, delay: D) -> Self {
        Self::new(cs, BitBang::new(sck, so), delay)
    }
}

impl<CS, T, D> Max31855<CS, T, D>
where
    CS: OutputPin,
    T: Transport,
    D: DelayNs,
{
    /// Driver over an arbitrary frame transport.
    pub fn new(cs: CS, transport: T, delay: D) -> Self {
        Self {
            cs,
            transport,
            delay,
        }
    }

    /// Idle the bus lines and wait out the chip's power-up time.
    ///
    /// Chip select rests high, which keeps the serial interface closed and
    /// the chip continuously converting.
    pub fn begin(&mut self) -> Result<(), Error<T::Error, CS::Error>> {
        self.cs.set_high().map_err(Error::ChipSelect)?;
        self.transport.init().map_err(Error::Transfer)?;
        self.delay.delay_ms(POWER_UP_TIME_MS);
        Ok(())
    }

    /// Acquire one fresh 32-bit frame.
    ///
    /// Aborts whatever conversion is running, triggers a new one, blocks for
    /// the full conversion time, then shifts the result out MSB first.
    /// Closing the interface immediately starts the next conversion.
    ///
    /// A missing or disconnected chip is not detectable here; it shows up as
    /// a frame whose identity bits fail downstream, never as a hang.
    pub fn read_raw(&mut self) -> Result<RawFrame, Error<T::Error, CS::Error>> {
        self.cs.set_low().map_err(Error::ChipSelect)?;
        self.delay.delay_ms(CS_ABORT_PULSE_MS);
        self.cs.set_high().map_err(Error::ChipSelect)?;
        self.delay.delay_ms(CONVERSION_TIME_MS);
        self.cs.set_low().map_err(Error::ChipSelect)?;
        let word = self.transport.read_frame().map_err(Error::Transfer)?;
        self.cs.set_high().map_err(Error::ChipSelect)?;
        Ok(RawFrame(word))
    }

    /// Acquire a frame and classify the thermocouple wiring state.
    ///
    /// Always yields a classification; faults are data here, not errors.
    pub fn read_fault(&mut self) -> Result<Fault, Error<T::Error, CS::Error>> {
        Ok(self.read_raw()?.fault())
    }

    /// Acquire a frame and check the reserved identity bits.
    pub fn read_identity(&mut self) -> Result<bool, Error<T::Error, CS::Error>> {
        Ok(self.read_raw()?.identity_ok())
    }

    /// Acquire a frame and decode the thermocouple temperature in degrees
    /// Celsius.
    ///
    /// To get several values out of one physical sample, use
    /// [`read_raw`](Self::read_raw) once and decode the returned
    /// [`RawFrame`] instead.
    pub fn read_thermocouple(&mut self) -> Result<f32, Error<T::Error, CS::Error>> {
        Ok(self.read_raw()?.thermocouple_celsius()?)
    }

    /// Acquire a frame and decode the cold-junction temperature in degrees
    /// Celsius.
    pub fn read_cold_junction(&mut self) -> Result<f32, Error<T::Error, CS::Error>> {
        Ok(self.read_raw()?.cold_junction_celsius()?)
    }
}

/// Log a fault classification for a numbered sensor channel.
#[cfg(feature = "defmt")]
pub fn log_fault(channel: u8, fault: Fault) {
    match fault {
        Fault::None => {}
        Fault::ShortToVcc => defmt::warn!("Sensor {} - thermocouple shorted to VCC", channel),
        Fault::ShortToGnd => defmt::warn!("Sensor {} - thermocouple shorted to GND", channel),
        Fault::OpenCircuit => defmt::warn!("Sensor {} - thermocouple not connected", channel),
        Fault::Unknown => defmt::warn!("Sensor {} - unspecified thermocouple fault", channel),
    }
}
