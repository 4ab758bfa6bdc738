//! SH1106 OLED driver over SPI.
//!
//! 128x64 panel with a page-addressed buffer: 8 pages of 128 columns, each
//! byte holding 8 vertically stacked pixels (bit `y % 8`).

use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, OutputPin};
use embedded_hal::spi::{self, SpiDevice};
use tracing::{debug, info, warn};

pub const WIDTH: usize = 128;
pub const HEIGHT: usize = 64;
pub const PAGES: usize = HEIGHT / 8;
pub const BUFFER_SIZE: usize = WIDTH * HEIGHT / 8;

pub const SPI_CLOCK_HZ: u32 = 2_000_000;
pub const SPI_MODE: spi::Mode = spi::MODE_0;

/// Encoded byte of a page column with no ink.
pub const BLANK: u8 = 0xFF;

const RESET_DELAY_MS: u32 = 100;
const POWER_ON_DELAY_MS: u32 = 100;
const PAGE_SETTLE_MS: u32 = 10;

/// SH1106 commands
pub mod cmd {
    pub const DISPLAY_OFF: u8 = 0xAE;
    pub const DISPLAY_ON: u8 = 0xAF;
    pub const SET_LOW_COLUMN: u8 = 0x00;
    pub const SET_HIGH_COLUMN: u8 = 0x10;
    pub const SET_PAGE_ADDR: u8 = 0xB0;
    pub const SET_START_LINE: u8 = 0x40;
    pub const SET_CONTRAST: u8 = 0x81;
    pub const SET_SEG_NORMAL: u8 = 0xA0;
    pub const SET_COM_SCAN_INC: u8 = 0xC0;
    pub const SET_NORMAL: u8 = 0xA6;
    pub const SET_MUX_RATIO: u8 = 0xA8;
    pub const SET_DISPLAY_OFFSET: u8 = 0xD3;
    pub const SET_CLOCK_DIV: u8 = 0xD5;
    pub const SET_PRECHARGE: u8 = 0xD9;
    pub const SET_COM_PINS: u8 = 0xDA;
    pub const SET_VCOM_DETECT: u8 = 0xDB;
    pub const SET_MEMORY_MODE: u8 = 0x20;
    pub const RESUME_RAM: u8 = 0xA4;

    /// The panel RAM is 132 columns wide; the visible 128 start at column 2.
    pub const COLUMN_OFFSET: u8 = 2;
}

pub const INIT_COMMANDS: [u8; 24] = [
    cmd::DISPLAY_OFF,
    cmd::SET_LOW_COLUMN | cmd::COLUMN_OFFSET,
    cmd::SET_HIGH_COLUMN,
    cmd::SET_START_LINE,
    cmd::SET_CONTRAST,
    cmd::SET_SEG_NORMAL,
    cmd::SET_COM_SCAN_INC,
    cmd::SET_NORMAL,
    cmd::SET_MUX_RATIO,
    0x3F, // 64 lines
    cmd::SET_DISPLAY_OFFSET,
    0x00,
    cmd::SET_CLOCK_DIV,
    0x80,
    cmd::SET_PRECHARGE,
    0xF1,
    cmd::SET_COM_PINS,
    0x12,
    cmd::SET_VCOM_DETECT,
    0x40,
    cmd::SET_MEMORY_MODE,
    0x02, // page addressing
    cmd::RESUME_RAM,
    cmd::SET_NORMAL,
];

#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    #[error("display hardware init failed: {0}")]
    HardwareInit(String),
    #[error("SPI write failed: {0:?}")]
    Spi(spi::ErrorKind),
    #[error("display control pin failed: {0:?}")]
    Pin(digital::ErrorKind),
}

fn spi_err<E: spi::Error>(e: E) -> DisplayError {
    DisplayError::Spi(e.kind())
}

fn pin_err<E: digital::Error>(e: E) -> DisplayError {
    DisplayError::Pin(e.kind())
}

// ── bitmap ────────────────────────────────────────────────────────────────────

/// Full-panel monochrome canvas. `BinaryColor::On` is ink.
#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap {
    pixels: Vec<bool>,
}

impl Bitmap {
    pub fn blank() -> Self {
        Self {
            pixels: vec![false; WIDTH * HEIGHT],
        }
    }

    pub fn is_ink(&self, x: usize, y: usize) -> bool {
        x < WIDTH && y < HEIGHT && self.pixels[y * WIDTH + x]
    }

    pub fn set_ink(&mut self, x: usize, y: usize, ink: bool) {
        if x < WIDTH && y < HEIGHT {
            self.pixels[y * WIDTH + x] = ink;
        }
    }

    pub fn ink_count(&self) -> usize {
        self.pixels.iter().filter(|&&p| p).count()
    }
}

impl Default for Bitmap {
    fn default() -> Self {
        Self::blank()
    }
}

impl std::fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bitmap")
            .field("ink", &self.ink_count())
            .finish()
    }
}

impl OriginDimensions for Bitmap {
    fn size(&self) -> Size {
        Size::new(WIDTH as u32, HEIGHT as u32)
    }
}

impl DrawTarget for Bitmap {
    type Color = BinaryColor;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x < 0 || point.y < 0 {
                continue;
            }
            self.set_ink(point.x as usize, point.y as usize, color.is_on());
        }
        Ok(())
    }
}

// ── page buffer ───────────────────────────────────────────────────────────────

#[derive(Clone, PartialEq, Eq)]
pub struct Framebuffer([u8; BUFFER_SIZE]);

impl Framebuffer {
    /// Start from all bits set and clear one bit per ink pixel.
    pub fn encode(bitmap: &Bitmap) -> Self {
        let mut buf = [BLANK; BUFFER_SIZE];
        for y in 0..HEIGHT {
            for x in 0..WIDTH {
                if bitmap.is_ink(x, y) {
                    buf[x + (y / 8) * WIDTH] &= !(1 << (y % 8));
                }
            }
        }
        Self(buf)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The 128 column bytes of `page`, or `None` past the last page.
    pub fn page(&self, page: usize) -> Option<&[u8]> {
        self.pages().nth(page)
    }

    pub fn byte(&self, column: usize, page: usize) -> Option<u8> {
        self.page(page)?.get(column).copied()
    }

    fn pages(&self) -> std::slice::ChunksExact<'_, u8> {
        self.0.chunks_exact(WIDTH)
    }
}

impl std::fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let blank = self.0.iter().filter(|&&b| b == BLANK).count();
        write!(f, "Framebuffer({} of {} bytes blank)", blank, BUFFER_SIZE)
    }
}

/// Byte that goes on the wire for an encoded column byte. The panel lights
/// set bits, so the default (`invert`) sends the complement and blank
/// columns go out as `0x00`.
pub fn wire_byte(encoded: u8, invert: bool) -> u8 {
    if invert {
        !encoded
    } else {
        encoded
    }
}

// ── panel seam ────────────────────────────────────────────────────────────────

/// Anything that can show a full-panel bitmap.
pub trait Panel {
    fn render(&mut self, bitmap: &Bitmap) -> Result<(), DisplayError>;

    fn clear(&mut self) -> Result<(), DisplayError> {
        self.render(&Bitmap::blank())
    }
}

/// Clears the wrapped panel when dropped if anything is still lit. Wrap a
/// panel as soon as it is initialised so early error paths blank it too.
pub struct ClearOnDrop<P: Panel> {
    panel: P,
    lit: bool,
}

impl<P: Panel> ClearOnDrop<P> {
    pub fn new(panel: P) -> Self {
        Self { panel, lit: true }
    }
}

impl<P: Panel> Panel for ClearOnDrop<P> {
    fn render(&mut self, bitmap: &Bitmap) -> Result<(), DisplayError> {
        let result = self.panel.render(bitmap);
        self.lit = result.is_err() || bitmap.ink_count() > 0;
        result
    }
}

impl<P: Panel> Drop for ClearOnDrop<P> {
    fn drop(&mut self) {
        if self.lit {
            if let Err(e) = self.panel.clear() {
                warn!("Display clear on drop failed: {}", e);
            }
        }
    }
}

// ── driver ────────────────────────────────────────────────────────────────────

/// SH1106 on a 4-wire SPI bus plus reset, data/command, chip-select and
/// backlight lines.
pub struct Sh1106<SPI, DC, RST, CS, BL, D> {
    spi: SPI,
    dc: DC,
    rst: RST,
    cs: CS,
    backlight: BL,
    delay: D,
    invert: bool,
}

impl<SPI, DC, RST, CS, BL, D> Sh1106<SPI, DC, RST, CS, BL, D>
where
    SPI: SpiDevice,
    DC: OutputPin,
    RST: OutputPin,
    CS: OutputPin,
    BL: OutputPin,
    D: DelayNs,
{
    pub fn new(spi: SPI, dc: DC, rst: RST, cs: CS, backlight: BL, delay: D) -> Self {
        Self {
            spi,
            dc,
            rst,
            cs,
            backlight,
            delay,
            invert: true,
        }
    }

    pub fn with_invert(mut self, invert: bool) -> Self {
        self.invert = invert;
        self
    }

    /// Control lines, reset pulse, init sequence, panel on. Any failure here
    /// is a [`DisplayError::HardwareInit`].
    pub fn init(&mut self) -> Result<(), DisplayError> {
        self.init_sequence()
            .map_err(|e| DisplayError::HardwareInit(e.to_string()))?;
        info!("SH1106 initialised");
        Ok(())
    }

    fn init_sequence(&mut self) -> Result<(), DisplayError> {
        self.cs.set_low().map_err(pin_err)?;
        self.backlight.set_high().map_err(pin_err)?;
        self.dc.set_low().map_err(pin_err)?;

        self.reset()?;
        for &c in INIT_COMMANDS.iter() {
            self.command(c)?;
        }
        self.delay.delay_ms(POWER_ON_DELAY_MS);
        self.command(cmd::DISPLAY_ON)
    }

    fn reset(&mut self) -> Result<(), DisplayError> {
        self.rst.set_high().map_err(pin_err)?;
        self.delay.delay_ms(RESET_DELAY_MS);
        self.rst.set_low().map_err(pin_err)?;
        self.delay.delay_ms(RESET_DELAY_MS);
        self.rst.set_high().map_err(pin_err)?;
        self.delay.delay_ms(RESET_DELAY_MS);
        Ok(())
    }

    fn command(&mut self, c: u8) -> Result<(), DisplayError> {
        self.dc.set_low().map_err(pin_err)?;
        self.spi.write(&[c]).map_err(spi_err)
    }

    /// Push a pre-encoded buffer to the panel, one page at a time.
    pub fn flush(&mut self, frame: &Framebuffer) -> Result<(), DisplayError> {
        let mut data = [0u8; WIDTH];
        for (page, bytes) in frame.pages().enumerate() {
            self.command(cmd::SET_PAGE_ADDR + page as u8)?;
            self.command(cmd::SET_LOW_COLUMN | cmd::COLUMN_OFFSET)?;
            self.command(cmd::SET_HIGH_COLUMN)?;
            self.delay.delay_ms(PAGE_SETTLE_MS);
            self.dc.set_high().map_err(pin_err)?;

            for (out, &b) in data.iter_mut().zip(bytes) {
                *out = wire_byte(b, self.invert);
            }
            self.spi.write(&data).map_err(spi_err)?;
        }
        debug!("SH1106 frame flushed");
        Ok(())
    }

    /// Tear the driver apart, e.g. to release the bus after the final clear.
    pub fn release(self) -> (SPI, DC, RST, CS, BL) {
        (self.spi, self.dc, self.rst, self.cs, self.backlight)
    }
}

impl<SPI, DC, RST, CS, BL, D> Panel for Sh1106<SPI, DC, RST, CS, BL, D>
where
    SPI: SpiDevice,
    DC: OutputPin,
    RST: OutputPin,
    CS: OutputPin,
    BL: OutputPin,
    D: DelayNs,
{
    fn render(&mut self, bitmap: &Bitmap) -> Result<(), DisplayError> {
        let frame = Framebuffer::encode(bitmap);
        self.flush(&frame)
    }
}
