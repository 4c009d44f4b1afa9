//! VT sequence parser
//!
//! Parses ANSI/VT escape sequences, including NetHack's tile-data
//! extension (`CSI ... z`), and updates the screen.

use super::state::{AttrFlags, Color, Screen};

/// Parameters kept per CSI sequence; the rest are dropped
const MAX_PARAMS: usize = 16;

/// Parser state machine
pub struct VtParser {
    state: ParserState,
    params: Vec<u16>,
    intermediates: Vec<u8>,
    current_param: Option<u16>,
}

#[derive(Clone, Copy, Default, PartialEq)]
enum ParserState {
    #[default]
    Ground,
    Escape,
    EscapeIntermediate,
    CsiEntry,
    CsiParam,
    CsiIntermediate,
    OscString,
    EscapeInOsc,  // ESC received within OSC, waiting for backslash
}

impl Default for VtParser {
    fn default() -> Self {
        Self::new()
    }
}

impl VtParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Ground,
            params: Vec::with_capacity(MAX_PARAMS),
            intermediates: Vec::with_capacity(4),
            current_param: None,
        }
    }

    /// Feed a single byte to the parser
    pub fn feed(&mut self, byte: u8, screen: &mut Screen) {
        // C0 controls act anywhere except inside OSC strings
        if byte < 0x20 && self.state != ParserState::OscString && self.state != ParserState::EscapeInOsc {
            match byte {
                0x1B => self.enter_escape(),
                0x08 => screen.backspace(),
                0x09 => screen.horizontal_tab(),
                0x0A | 0x0B | 0x0C => screen.linefeed(),
                0x0D => screen.carriage_return(),
                _ => {} // BEL, NUL and the rest
            }
            return;
        }

        match self.state {
            ParserState::Ground => self.ground(byte, screen),
            ParserState::Escape => self.escape(byte, screen),
            ParserState::EscapeIntermediate => self.escape_intermediate(byte),
            ParserState::CsiEntry => self.csi_entry(byte, screen),
            ParserState::CsiParam => self.csi_param(byte, screen),
            ParserState::CsiIntermediate => self.csi_intermediate(byte, screen),
            ParserState::OscString => self.osc_string(byte),
            ParserState::EscapeInOsc => self.escape_in_osc(byte, screen),
        }
    }

    /// Feed a decoded non-ASCII character. It is printed only between
    /// sequences; inside OSC it is part of the string, anywhere else it
    /// aborts the sequence.
    pub fn print(&mut self, ch: char, screen: &mut Screen) {
        match self.state {
            ParserState::Ground => screen.put_char(ch),
            ParserState::OscString => {}
            _ => self.state = ParserState::Ground,
        }
    }

    fn push_param(&mut self, param: u16) {
        if self.params.len() < MAX_PARAMS {
            self.params.push(param);
        }
    }

    /// Handle ESC received within an OSC string
    fn escape_in_osc(&mut self, byte: u8, screen: &mut Screen) {
        if byte == b'\\' {
            self.state = ParserState::Ground;
        } else {
            // Not ST: the OSC is over and this byte starts a new escape
            self.enter_escape();
            self.escape(byte, screen);
        }
    }

    fn enter_escape(&mut self) {
        self.state = ParserState::Escape;
        self.params.clear();
        self.intermediates.clear();
        self.current_param = None;
    }

    fn ground(&mut self, byte: u8, screen: &mut Screen) {
        if byte == 0x7F {
            return;
        }
        screen.put_char(byte as char);
    }

    fn escape(&mut self, byte: u8, screen: &mut Screen) {
        self.state = ParserState::Ground;
        match byte {
            b'[' => {
                self.state = ParserState::CsiEntry;
                self.params.clear();
                self.intermediates.clear();
                self.current_param = None;
            }
            b']' => self.state = ParserState::OscString,
            b'7' => screen.save_cursor(),
            b'8' => screen.restore_cursor(),
            b'D' => screen.index(),
            b'E' => {
                screen.carriage_return();
                screen.linefeed();
            }
            b'M' => screen.reverse_index(),
            b'c' => screen.reset(),
            0x20..=0x2F => {
                self.intermediates.push(byte);
                self.state = ParserState::EscapeIntermediate;
            }
            _ => {}
        }
    }

    fn escape_intermediate(&mut self, byte: u8) {
        match byte {
            0x20..=0x2F => self.intermediates.push(byte),
            // Final byte: charset selections, nothing to do
            _ => self.state = ParserState::Ground,
        }
    }

    fn csi_entry(&mut self, byte: u8, screen: &mut Screen) {
        match byte {
            b'0'..=b'9' => {
                self.current_param = Some((byte - b'0') as u16);
                self.state = ParserState::CsiParam;
            }
            b';' => {
                self.push_param(0);
                self.state = ParserState::CsiParam;
            }
            b'?' | b'>' | b'!' | b'=' => {
                self.intermediates.push(byte);
            }
            0x20..=0x2F => {
                self.intermediates.push(byte);
                self.state = ParserState::CsiIntermediate;
            }
            0x40..=0x7E => self.execute_csi(byte, screen),
            _ => self.state = ParserState::Ground,
        }
    }

    fn csi_param(&mut self, byte: u8, screen: &mut Screen) {
        match byte {
            b'0'..=b'9' => {
                let digit = (byte - b'0') as u16;
                self.current_param = Some(
                    self.current_param.unwrap_or(0).saturating_mul(10).saturating_add(digit)
                );
            }
            b';' | b':' => {
                let param = self.current_param.take().unwrap_or(0);
                self.push_param(param);
            }
            0x20..=0x2F => {
                if let Some(p) = self.current_param.take() {
                    self.push_param(p);
                }
                self.intermediates.push(byte);
                self.state = ParserState::CsiIntermediate;
            }
            0x40..=0x7E => {
                if let Some(p) = self.current_param.take() {
                    self.push_param(p);
                }
                self.execute_csi(byte, screen);
            }
            _ => self.state = ParserState::Ground,
        }
    }

    fn csi_intermediate(&mut self, byte: u8, screen: &mut Screen) {
        match byte {
            0x20..=0x2F => self.intermediates.push(byte),
            0x40..=0x7E => self.execute_csi(byte, screen),
            _ => self.state = ParserState::Ground,
        }
    }

    fn osc_string(&mut self, byte: u8) {
        match byte {
            // BEL or 8-bit ST terminates
            0x07 | 0x9C => self.state = ParserState::Ground,
            0x1B => self.state = ParserState::EscapeInOsc,
            // Titles and the like are not part of the screen
            _ => {}
        }
    }

    fn execute_csi(&mut self, final_byte: u8, screen: &mut Screen) {
        self.state = ParserState::Ground;

        let is_private = self.intermediates.contains(&b'?');
        if !self.intermediates.iter().all(|&b| b == b'?') {
            tracing::debug!(
                "Ignoring CSI: intermediates={:?}, params={:?}, final={:?}",
                self.intermediates,
                self.params,
                final_byte as char
            );
            return;
        }

        let params = &self.params;
        let count = params.first().copied().unwrap_or(1).max(1);

        match (is_private, final_byte) {
            // Cursor movement
            (false, b'A') => screen.cursor_up(count),
            (false, b'B') => screen.cursor_down(count),
            (false, b'C') => screen.cursor_forward(count),
            (false, b'D') => screen.cursor_backward(count),
            (false, b'E') => {
                // CNL - Cursor Next Line
                screen.cursor_down(count);
                screen.carriage_return();
            }
            (false, b'F') => {
                // CPL - Cursor Previous Line
                screen.cursor_up(count);
                screen.carriage_return();
            }
            (false, b'G') => screen.set_column(params.first().copied().unwrap_or(1)),
            (false, b'H') | (false, b'f') => {
                let row = params.first().copied().unwrap_or(1);
                let col = params.get(1).copied().unwrap_or(1);
                screen.cursor_position(row, col);
            }
            (false, b'd') => screen.set_row(params.first().copied().unwrap_or(1)),

            // Erase
            (false, b'J') => screen.erase_in_display(params.first().copied().unwrap_or(0)),
            (false, b'K') => screen.erase_in_line(params.first().copied().unwrap_or(0)),

            // Lines and characters
            (false, b'L') => screen.insert_lines(count),
            (false, b'M') => screen.delete_lines(count),
            (false, b'@') => screen.insert_chars(count),
            (false, b'P') => screen.delete_chars(count),
            (false, b'X') => screen.erase_chars(count),

            // Scroll
            (false, b'S') => screen.scroll_up(count),
            (false, b'T') => screen.scroll_down(count),
            (false, b'r') => {
                let top = params.first().copied().unwrap_or(1);
                let bottom = params.get(1).copied().unwrap_or(screen.rows);
                screen.set_scroll_region(top, bottom);
                screen.cursor_position(1, 1);
            }

            (false, b'm') => Self::execute_sgr(params, screen),

            (false, b's') => screen.save_cursor(),
            (false, b'u') => screen.restore_cursor(),

            // NetHack tile data
            (false, b'z') => Self::execute_tile_data(params, screen),

            (true, b'h') => params.iter().for_each(|&p| screen.set_private_mode(p, true)),
            (true, b'l') => params.iter().for_each(|&p| screen.set_private_mode(p, false)),

            _ => {
                tracing::debug!(
                    "Unknown CSI: private={}, params={:?}, final={:?}",
                    is_private,
                    params,
                    final_byte as char
                );
            }
        }
    }

    /// `CSI 0;n z` start glyph, `CSI 1 z` end glyph,
    /// `CSI 2;w z` select window, `CSI 3 z` end of data.
    fn execute_tile_data(params: &[u16], screen: &mut Screen) {
        match params {
            [0, glyph, ..] => screen.start_glyph(*glyph),
            [1, ..] => screen.end_glyph(),
            // Window selection and end-of-data only frame the stream
            _ => {}
        }
    }

    fn execute_sgr(params: &[u16], screen: &mut Screen) {
        let attrs = &mut screen.current_attrs;
        if params.is_empty() {
            attrs.reset();
            return;
        }

        let mut iter = params.iter();

        while let Some(&param) = iter.next() {
            match param {
                0 => attrs.reset(),
                1 => attrs.flags |= AttrFlags::BOLD,
                2 => attrs.flags |= AttrFlags::DIM,
                3 => attrs.flags |= AttrFlags::ITALIC,
                4 => attrs.flags |= AttrFlags::UNDERLINE,
                5 => attrs.flags |= AttrFlags::BLINK,
                7 => attrs.flags |= AttrFlags::INVERSE,
                8 => attrs.flags |= AttrFlags::HIDDEN,
                9 => attrs.flags |= AttrFlags::STRIKETHROUGH,

                22 => attrs.flags &= !(AttrFlags::BOLD | AttrFlags::DIM),
                23 => attrs.flags &= !AttrFlags::ITALIC,
                24 => attrs.flags &= !AttrFlags::UNDERLINE,
                25 => attrs.flags &= !AttrFlags::BLINK,
                27 => attrs.flags &= !AttrFlags::INVERSE,
                28 => attrs.flags &= !AttrFlags::HIDDEN,
                29 => attrs.flags &= !AttrFlags::STRIKETHROUGH,

                30..=37 => attrs.fg = Color::Indexed((param - 30) as u8),
                38 => {
                    if let Some(color) = Self::extended_color(&mut iter) {
                        attrs.fg = color;
                    }
                }
                39 => attrs.fg = Color::Default,

                40..=47 => attrs.bg = Color::Indexed((param - 40) as u8),
                48 => {
                    if let Some(color) = Self::extended_color(&mut iter) {
                        attrs.bg = color;
                    }
                }
                49 => attrs.bg = Color::Default,

                90..=97 => attrs.fg = Color::Indexed((param - 90 + 8) as u8),
                100..=107 => attrs.bg = Color::Indexed((param - 100 + 8) as u8),

                _ => {}
            }
        }
    }

    /// `5;n` (256 colors) or `2;r;g;b` following a 38/48
    fn extended_color<'a>(iter: &mut impl Iterator<Item = &'a u16>) -> Option<Color> {
        match iter.next()? {
            5 => iter.next().map(|&n| Color::Indexed(n as u8)),
            2 => {
                let r = iter.next().copied().unwrap_or(0) as u8;
                let g = iter.next().copied().unwrap_or(0) as u8;
                let b = iter.next().copied().unwrap_or(0) as u8;
                Some(Color::Rgb(r, g, b))
            }
            _ => None,
        }
    }
}
