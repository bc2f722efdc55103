//! Turns numbers and text into display cells.
//!
//! Nothing in here touches the bus. A [`Field`] is a left-to-right run of
//! cells that the driver writes starting at some logical digit. Numbers are
//! right-aligned: leading zeros become blanks and the sign sits right in
//! front of the first digit.

use heapless::{String, Vec};

pub const DIGITS: usize = 8;

// Code-B font, values 0x00..=0x09 are the decimal digits
pub const CODE_HYPHEN: u8 = 0x0A;
pub const CODE_E: u8 = 0x0B;
pub const CODE_H: u8 = 0x0C;
pub const CODE_L: u8 = 0x0D;
pub const CODE_P: u8 = 0x0E;
pub const CODE_BLANK: u8 = 0x0F;

// Segment bits of a digit register in no-decode mode
pub const SEG_DP: u8 = 0x80;
const SEG_A: u8 = 0x40;
const SEG_B: u8 = 0x20;
const SEG_C: u8 = 0x10;
const SEG_D: u8 = 0x08;
const SEG_E: u8 = 0x04;
const SEG_F: u8 = 0x02;
const SEG_G: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Glyph {
    /// Code-B character, shown by a digit in decode mode
    Code(u8),
    /// Raw a..g segments, shown by a digit in no-decode mode
    Segments(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Cell {
    pub glyph: Glyph,
    pub dp: bool,
}

impl Cell {
    pub const BLANK: Cell = Cell::code(CODE_BLANK);

    pub const fn code(value: u8) -> Self {
        Cell {
            glyph: Glyph::Code(value & 0x0F),
            dp: false,
        }
    }

    pub const fn segments(bits: u8) -> Self {
        Cell {
            glyph: Glyph::Segments(bits & !SEG_DP),
            dp: false,
        }
    }

    pub const fn with_dp(self) -> Self {
        Cell {
            glyph: self.glyph,
            dp: true,
        }
    }

    /// Whether the digit showing this cell has to be in Code-B decode mode.
    pub fn is_decoded(&self) -> bool {
        matches!(self.glyph, Glyph::Code(_))
    }

    /// Value for the digit register.
    pub fn data(&self) -> u8 {
        let bits = match self.glyph {
            Glyph::Code(value) => value,
            Glyph::Segments(bits) => bits,
        };
        if self.dp {
            bits | SEG_DP
        } else {
            bits
        }
    }
}

pub type Field = Vec<Cell, DIGITS>;

const ERR: [Cell; 3] = [
    Cell::code(CODE_E),
    Cell::segments(SEG_E | SEG_G),
    Cell::segments(SEG_E | SEG_G),
];

fn push(field: &mut Field, cell: Cell) {
    // Widths are clamped to DIGITS before anything is pushed
    let _ = field.push(cell);
}

fn pad(field: &mut Field, count: usize) {
    for _ in 0..count {
        push(field, Cell::BLANK);
    }
}

fn digit_count(value: u64) -> usize {
    value.checked_ilog10().map_or(1, |log| log as usize + 1)
}

fn pow10(exp: usize) -> u64 {
    10u64.saturating_pow(exp as u32)
}

fn round_scaled(magnitude: f64, decimals: usize) -> u64 {
    (magnitude * pow10(decimals) as f64 + 0.5) as u64
}

/// Pushes the lowest `len` decimal digits of `value`, most significant
/// first, with the point after the digit at index `dp_at`.
fn push_digits(field: &mut Field, value: u64, len: usize, dp_at: Option<usize>) {
    for index in 0..len {
        let digit = (value / pow10(len - 1 - index) % 10) as u8;
        let cell = Cell::code(digit);
        push(field, if dp_at == Some(index) { cell.with_dp() } else { cell });
    }
}

/// "Err", right-aligned. Narrower fields keep as much of it as fits.
pub fn render_error(width: usize) -> Field {
    let width = width.min(DIGITS);
    let shown = width.min(ERR.len());

    let mut field = Field::new();
    pad(&mut field, width - shown);
    for cell in &ERR[..shown] {
        push(&mut field, *cell);
    }
    field
}

/// Signed integer, right-aligned in `width` cells, or "Err" when it needs more.
pub fn render_integer(value: i32, width: usize) -> Field {
    let width = width.min(DIGITS);
    let mut buffer = itoa::Buffer::new();
    let text = buffer.format(value);
    if text.len() > width {
        return render_error(width);
    }

    let mut field = Field::new();
    pad(&mut field, width - text.len());
    for byte in text.bytes() {
        let cell = match byte {
            b'-' => Cell::code(CODE_HYPHEN),
            digit => Cell::code(digit - b'0'),
        };
        push(&mut field, cell);
    }
    field
}

/// Exactly `width` zero-padded digits. Higher digits that do not fit are dropped.
pub fn render_padded(value: u32, width: usize) -> Field {
    let width = width.min(DIGITS);
    let mut field = Field::new();
    push_digits(&mut field, u64::from(value), width, None);
    field
}

/// Hyphen (or blank) followed by three zero-padded digits.
pub fn render_int8(value: i8) -> Field {
    let mut field = Field::new();
    push(
        &mut field,
        if value < 0 {
            Cell::code(CODE_HYPHEN)
        } else {
            Cell::BLANK
        },
    );
    push_digits(&mut field, u64::from(value.unsigned_abs()), 3, None);
    field
}

/// Float in `width` cells with up to `decimals` places.
///
/// Places are given up while the integer part needs the room. When even
/// the integer part does not fit, the value is shown as `m.mmE[-]x`. NaN,
/// infinities and anything the exponential form cannot hold show "Err".
pub fn render_float(value: f32, width: usize, decimals: u8) -> Field {
    let width = width.min(DIGITS);
    if !value.is_finite() {
        return render_error(width);
    }

    let negative = value < 0.0;
    let magnitude = if negative {
        -f64::from(value)
    } else {
        f64::from(value)
    };
    let Some(available) = width.checked_sub(usize::from(negative)) else {
        return render_error(width);
    };

    fixed_point(magnitude, negative, width, available, usize::from(decimals))
        .unwrap_or_else(|| exponential(magnitude, negative, width, available, usize::from(decimals)))
}

fn fixed_point(
    magnitude: f64,
    negative: bool,
    width: usize,
    available: usize,
    decimals: usize,
) -> Option<Field> {
    let int_digits = digit_count(magnitude as u64);
    if int_digits > available {
        return None;
    }

    let mut decimals = decimals.min(available - int_digits);
    loop {
        let scaled = round_scaled(magnitude, decimals);
        // Rounding can carry into a new integer digit
        let len = digit_count(scaled).max(decimals + 1);
        if len <= available {
            let sign = negative && scaled != 0;
            let mut field = Field::new();
            pad(&mut field, width - len - usize::from(sign));
            if sign {
                push(&mut field, Cell::code(CODE_HYPHEN));
            }
            let dp_at = (decimals > 0).then(|| len - decimals - 1);
            push_digits(&mut field, scaled, len, dp_at);
            return Some(field);
        }
        if decimals == 0 {
            return None;
        }
        decimals -= 1;
    }
}

fn exponential(
    magnitude: f64,
    negative: bool,
    width: usize,
    available: usize,
    decimals: usize,
) -> Field {
    // One mantissa digit, 'E' and one exponent digit at least
    if available < 3 || magnitude == 0.0 {
        return render_error(width);
    }

    let mut mantissa = magnitude;
    let mut exponent: i32 = 0;
    while mantissa >= 10.0 {
        mantissa /= 10.0;
        exponent += 1;
    }
    while mantissa < 1.0 {
        mantissa *= 10.0;
        exponent -= 1;
    }

    loop {
        let exponent_len =
            digit_count(u64::from(exponent.unsigned_abs())) + usize::from(exponent < 0);
        let room = available.saturating_sub(exponent_len + 1);
        if room == 0 {
            return render_error(width);
        }

        let mantissa_len = room.min(decimals + 1);
        let scaled = round_scaled(mantissa, mantissa_len - 1);
        if scaled >= pow10(mantissa_len) {
            mantissa /= 10.0;
            exponent += 1;
            continue;
        }

        let mut field = Field::new();
        pad(
            &mut field,
            width - usize::from(negative) - mantissa_len - 1 - exponent_len,
        );
        if negative {
            push(&mut field, Cell::code(CODE_HYPHEN));
        }
        push_digits(&mut field, scaled, mantissa_len, (mantissa_len > 1).then_some(0));
        push(&mut field, Cell::code(CODE_E));
        if exponent < 0 {
            push(&mut field, Cell::code(CODE_HYPHEN));
        }
        let exponent_digits = exponent.unsigned_abs();
        push_digits(
            &mut field,
            u64::from(exponent_digits),
            digit_count(u64::from(exponent_digits)),
            None,
        );
        return field;
    }
}

fn segments_for(ch: char) -> u8 {
    match ch.to_ascii_lowercase() {
        '0' => SEG_A | SEG_B | SEG_C | SEG_D | SEG_E | SEG_F,
        '1' => SEG_B | SEG_C,
        '2' | 'z' => SEG_A | SEG_B | SEG_D | SEG_E | SEG_G,
        '3' => SEG_A | SEG_B | SEG_C | SEG_D | SEG_G,
        '4' => SEG_B | SEG_C | SEG_F | SEG_G,
        '5' | 's' => SEG_A | SEG_C | SEG_D | SEG_F | SEG_G,
        '6' => SEG_A | SEG_C | SEG_D | SEG_E | SEG_F | SEG_G,
        '7' => SEG_A | SEG_B | SEG_C,
        '8' => SEG_A | SEG_B | SEG_C | SEG_D | SEG_E | SEG_F | SEG_G,
        '9' | 'g' => SEG_A | SEG_B | SEG_C | SEG_D | SEG_F | SEG_G,
        'a' => SEG_A | SEG_B | SEG_C | SEG_E | SEG_F | SEG_G,
        'b' => SEG_C | SEG_D | SEG_E | SEG_F | SEG_G,
        'c' => SEG_D | SEG_E | SEG_G,
        'd' => SEG_B | SEG_C | SEG_D | SEG_E | SEG_G,
        'e' => SEG_A | SEG_D | SEG_E | SEG_F | SEG_G,
        'f' => SEG_A | SEG_E | SEG_F | SEG_G,
        'h' | 'k' | 'x' => SEG_B | SEG_C | SEG_E | SEG_F | SEG_G,
        'i' => SEG_C,
        'j' => SEG_B | SEG_C | SEG_D,
        'l' => SEG_D | SEG_E | SEG_F,
        'm' => SEG_A | SEG_C | SEG_E,
        'n' => SEG_C | SEG_E | SEG_G,
        'o' => SEG_C | SEG_D | SEG_E | SEG_G,
        'p' => SEG_A | SEG_B | SEG_E | SEG_F | SEG_G,
        'q' => SEG_A | SEG_B | SEG_C | SEG_F | SEG_G,
        'r' => SEG_E | SEG_G,
        't' => SEG_D | SEG_E | SEG_F | SEG_G,
        'u' => SEG_C | SEG_D | SEG_E,
        'v' => SEG_B | SEG_C | SEG_D | SEG_E | SEG_F,
        'w' => SEG_B | SEG_D | SEG_F,
        'y' => SEG_B | SEG_C | SEG_D | SEG_F | SEG_G,
        '-' => SEG_G,
        '_' => SEG_D,
        '=' => SEG_D | SEG_G,
        '\'' => SEG_F,
        '"' => SEG_B | SEG_F,
        '/' => SEG_B | SEG_E | SEG_G,
        '\\' => SEG_C | SEG_F | SEG_G,
        _ => 0,
    }
}

/// Text in the segment font, left-aligned and blank-filled to `width`.
///
/// A '.' lights the point of the cell before it. Characters without a
/// glyph show as blanks and whatever does not fit is cut off.
pub fn render_text(text: &str, width: usize) -> Field {
    let width = width.min(DIGITS);
    let mut field = Field::new();

    for ch in text.chars() {
        if ch == '.' {
            if let Some(last) = field.last_mut() {
                if !last.dp {
                    last.dp = true;
                    continue;
                }
            }
            if field.len() == width {
                break;
            }
            push(&mut field, Cell::segments(0).with_dp());
            continue;
        }
        if field.len() == width {
            break;
        }
        push(&mut field, Cell::segments(segments_for(ch)));
    }

    while field.len() < width {
        push(&mut field, Cell::segments(0));
    }
    field
}

/// The `DIGITS` characters of `text` starting at `offset`, wrapping
/// around to the beginning so a scrolling marquee never runs short.
pub fn scroll_window(text: &str, offset: usize) -> String<DIGITS> {
    let mut window = String::new();
    let count = text.chars().count();
    if count == 0 {
        return window;
    }
    for ch in text.chars().cycle().skip(offset % count).take(DIGITS) {
        if window.push(ch).is_err() {
            break;
        }
    }
    window
}
