//! Linux bindings for the panel and the buttons (spidev + gpio character device).

use anyhow::Context;
use embedded_hal::digital::{ErrorType, OutputPin};
use embedded_hal::spi;
use linux_embedded_hal::{
    gpio_cdev::{Chip, LineRequestFlags},
    spidev::{SpiModeFlags, SpidevOptions},
    CdevPin, Delay, SpidevDevice,
};
use radia_core::config::{ButtonsConfig, DisplayConfig};
use radia_core::display::{Sh1106, SPI_CLOCK_HZ, SPI_MODE};
use radia_core::input::Button;
use tracing::info;

pub type Display = Sh1106<SpidevDevice, CdevPin, CdevPin, ChipSelect, CdevPin, Delay>;

/// Chip select either driven as a plain GPIO or left to the spidev driver,
/// which asserts CE0 around every transfer.
pub enum ChipSelect {
    Gpio(CdevPin),
    Kernel,
}

impl ErrorType for ChipSelect {
    type Error = <CdevPin as ErrorType>::Error;
}

impl OutputPin for ChipSelect {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        match self {
            ChipSelect::Gpio(pin) => pin.set_low(),
            ChipSelect::Kernel => Ok(()),
        }
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        match self {
            ChipSelect::Gpio(pin) => pin.set_high(),
            ChipSelect::Kernel => Ok(()),
        }
    }
}

fn spi_mode_flags(mode: spi::Mode) -> SpiModeFlags {
    use spi::{Phase, Polarity};
    match (mode.polarity, mode.phase) {
        (Polarity::IdleLow, Phase::CaptureOnFirstTransition) => SpiModeFlags::SPI_MODE_0,
        (Polarity::IdleLow, Phase::CaptureOnSecondTransition) => SpiModeFlags::SPI_MODE_1,
        (Polarity::IdleHigh, Phase::CaptureOnFirstTransition) => SpiModeFlags::SPI_MODE_2,
        (Polarity::IdleHigh, Phase::CaptureOnSecondTransition) => SpiModeFlags::SPI_MODE_3,
    }
}

fn output_pin(chip: &mut Chip, offset: u32, initial: u8, consumer: &str) -> anyhow::Result<CdevPin> {
    let handle = chip
        .get_line(offset)
        .with_context(|| format!("getting {} line (GPIO {})", consumer, offset))?
        .request(LineRequestFlags::OUTPUT, initial, consumer)
        .with_context(|| format!("requesting {} line (GPIO {})", consumer, offset))?;
    CdevPin::new(handle).with_context(|| format!("creating {} pin", consumer))
}

/// Open the bus and pins, then run the panel power-up sequence.
pub fn open_display(cfg: &DisplayConfig) -> anyhow::Result<Display> {
    let mut spi = SpidevDevice::open(&cfg.spi_device)
        .with_context(|| format!("opening SPI device {:?}", cfg.spi_device))?;
    let options = SpidevOptions::new()
        .bits_per_word(8)
        .max_speed_hz(SPI_CLOCK_HZ)
        .mode(spi_mode_flags(SPI_MODE))
        .build();
    spi.configure(&options).context("configuring SPI")?;

    let mut chip = Chip::new(&cfg.gpio_chip)
        .with_context(|| format!("opening GPIO chip {:?}", cfg.gpio_chip))?;
    let dc = output_pin(&mut chip, cfg.dc_pin, 0, "radia-dc")?;
    let rst = output_pin(&mut chip, cfg.reset_pin, 1, "radia-rst")?;
    let backlight = output_pin(&mut chip, cfg.backlight_pin, 0, "radia-bl")?;
    let cs = match cfg.cs_pin {
        Some(offset) => ChipSelect::Gpio(output_pin(&mut chip, offset, 1, "radia-cs")?),
        None => ChipSelect::Kernel,
    };

    let mut display = Sh1106::new(spi, dc, rst, cs, backlight, Delay).with_invert(cfg.invert);
    display.init()?;
    info!("Display ready on {:?}", cfg.spi_device);
    Ok(display)
}

/// Request every button line as an input. Presses read low.
pub fn open_buttons(cfg: &ButtonsConfig) -> anyhow::Result<Vec<(Button, CdevPin)>> {
    let mut chip = Chip::new(&cfg.gpio_chip)
        .with_context(|| format!("opening GPIO chip {:?}", cfg.gpio_chip))?;
    Button::ALL
        .iter()
        .map(|&button| {
            let offset = button.gpio();
            let handle = chip
                .get_line(offset)
                .with_context(|| format!("getting {} line (GPIO {})", button.label(), offset))?
                // no bias flags in the v1 uAPI; pull-ups are set in the board's config.txt
                .request(LineRequestFlags::INPUT, 0, "radia-button")
                .with_context(|| format!("requesting {} line (GPIO {})", button.label(), offset))?;
            let pin = CdevPin::new(handle)
                .with_context(|| format!("creating {} pin", button.label()))?;
            Ok((button, pin))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panel_runs_in_mode_zero() {
        assert_eq!(spi_mode_flags(SPI_MODE), SpiModeFlags::SPI_MODE_0);
        assert_eq!(spi_mode_flags(spi::MODE_3), SpiModeFlags::SPI_MODE_3);
    }

    #[test]
    fn test_kernel_chip_select_is_a_no_op() {
        let mut cs = ChipSelect::Kernel;
        assert!(cs.set_low().is_ok());
        assert!(cs.set_high().is_ok());
    }
}
