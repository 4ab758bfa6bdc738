//! Station browser screen.
//!
//! Four 15 px rows in a 13 px mono font: the playing station, then the
//! previous, selected and next entries of the sorted catalog.

use embedded_graphics::mono_font::iso_8859_2::FONT_6X13;
use embedded_graphics::mono_font::{MonoTextStyle, MonoTextStyleBuilder};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Baseline, Text};

use crate::catalog::{Cursor, StationCatalog};
use crate::display::Bitmap;

pub const ROW_PITCH: i32 = 15;
pub const ROWS: usize = 4;

/// Shown in the selection row when there is nothing to select.
pub const ERROR_LABEL: &str = "ERROR";

const PLAYING_MARKER: &str = "* ";
const SELECTED_MARKER: &str = ">";
const NEIGHBOUR_MARKER: &str = " ";

fn text_style() -> MonoTextStyle<'static, BinaryColor> {
    MonoTextStyleBuilder::new()
        .font(&FONT_6X13)
        .text_color(BinaryColor::On)
        .build()
}

/// Row texts, top to bottom.
pub fn view_lines(names: &[&str], cursor: usize, playing: Option<&str>) -> [String; ROWS] {
    let mut lines: [String; ROWS] = Default::default();

    if let Some(name) = playing {
        lines[0] = format!("{}{}", PLAYING_MARKER, name);
    }

    match names.get(cursor) {
        None => lines[2] = ERROR_LABEL.to_string(),
        Some(selected) => {
            lines[2] = format!("{}{}", SELECTED_MARKER, selected);
            if cursor > 0 {
                lines[1] = format!("{}{}", NEIGHBOUR_MARKER, names[cursor - 1]);
            }
            if let Some(next) = names.get(cursor + 1) {
                lines[3] = format!("{}{}", NEIGHBOUR_MARKER, next);
            }
        }
    }
    lines
}

pub fn draw_lines(lines: &[String; ROWS]) -> Bitmap {
    let mut bitmap = Bitmap::blank();
    let style = text_style();
    for (row, line) in lines.iter().enumerate() {
        if line.is_empty() {
            continue;
        }
        let origin = Point::new(0, row as i32 * ROW_PITCH);
        // Drawing into a Bitmap cannot fail.
        let _ = Text::with_baseline(line, origin, style, Baseline::Top).draw(&mut bitmap);
    }
    bitmap
}

pub fn render(catalog: &StationCatalog, cursor: &Cursor, playing: Option<&str>) -> Bitmap {
    let names = catalog.sorted_names();
    draw_lines(&view_lines(&names, cursor.index(), playing))
}
