//! Screen reconstruction from the game's byte stream.
//!
//! - **state**: fixed cell grid, cursor and cell attributes
//! - **parser**: VT escape sequence parser (with NetHack tile data)

pub mod parser;
pub mod state;

pub use parser::VtParser;
pub use state::{AttrFlags, Cell, CellAttrs, CellGrid, Color, Cursor, Screen, NO_GLYPH};

/// A screen plus the parser that feeds it
pub struct Terminal {
    screen: Screen,
    parser: VtParser,
}

impl Terminal {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self {
            screen: Screen::new(cols, rows),
            parser: VtParser::new(),
        }
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    pub fn cursor(&self) -> Cursor {
        self.screen.cursor()
    }

    /// Text content of every row
    pub fn display(&self) -> Vec<String> {
        self.screen.display()
    }

    /// Rows joined with single spaces, the form prompt matching searches
    pub fn text(&self) -> String {
        self.screen.display().join(" ")
    }

    pub fn to_grid(&self) -> CellGrid {
        self.screen.to_grid()
    }

    /// Feed raw bytes into the terminal. Never fails; anything that does
    /// not decode is dropped.
    pub fn feed(&mut self, bytes: &[u8]) {
        let mut i = 0;
        while i < bytes.len() {
            let b = bytes[i];

            if b < 0x80 {
                self.parser.feed(b, &mut self.screen);
                i += 1;
                continue;
            }

            // UTF-8 multi-byte sequence
            let seq_len = if b & 0xE0 == 0xC0 { 2 }
                else if b & 0xF0 == 0xE0 { 3 }
                else if b & 0xF8 == 0xF0 { 4 }
                else { 1 };

            if seq_len > 1 && i + seq_len <= bytes.len() {
                if let Ok(s) = std::str::from_utf8(&bytes[i..i + seq_len]) {
                    for ch in s.chars() {
                        self.parser.print(ch, &mut self.screen);
                    }
                    i += seq_len;
                    continue;
                }
            }

            // Invalid or incomplete sequence, skip byte
            i += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGIN_FRAME: &[u8] = b"\x1b[2;0z\x1b[2;1z\x1b[H\x1b[K\x1b[2;3z\x1b[2J\x1b[H\x1b[2;1z\x1b[2;3z\x1b[4;69H\x1b[0;832z-\x1b[1z\x1b[0;831z-\x1b[1z\x1b[0;833z-\x1b[1z\x1b[0m\x1b[5;69H\x1b[0;830z|\x1b[1z\x1b[0;848z\x1b[0m\x1b[1m\x1b[30m.\x1b[1z\x1b[0;16z\x1b[0m\x1b[1m\x1b[37m\x1b[7md\x1b[0m\x1b[0m\x1b[1z\x1b[23;1H\x1b[K[\x1b[7m\x08\x1b[1m\x1b[32m\x1b[CAa the Stripling\x1b[0m\x1b[0m\x1b[0m\r\x1b[23;18H]          St:18/02 Dx:14 Co:16 In:8 Wi:9 Ch:8  Lawful S:0\r\x1b[24;1HDlvl:1  $:0  HP:\x1b[K\r\x1b[1m\x1b[32m\x1b[24;17H18(18)\x1b[0m\r\x1b[24;23H Pw:\r\x1b[1m\x1b[32m\x1b[24;27H1(1)\x1b[0m\r\x1b[24;31H AC:6  Xp:1/0 T:1\x1b[2;1z\x1b[HVelkommen aa, the dwarven Valkyrie, welcome back to NetHack!\x1b[K\x1b[2;3z\x1b[5;71H\x1b[3z";

    #[test]
    fn test_game_frame_reconstruction() {
        let mut term = Terminal::new(80, 24);
        term.feed(LOGIN_FRAME);

        let display = term.display();
        assert!(display[0].starts_with("Velkommen aa, the dwarven Valkyrie"));
        assert!(display[22].contains("St:18/02 Dx:14"));
        assert!(display[23].starts_with("Dlvl:1  $:0  HP:18(18) Pw:1(1) AC:6  Xp:1/0 T:1"));
        assert_eq!(&display[4][68..71], "|.d");

        let grid = term.to_grid();
        assert_eq!(grid.get(4, 70).map(|c| c.glyph), Some(16));
        assert_eq!(grid.get(3, 68).map(|c| c.glyph), Some(832));
        assert_eq!(term.cursor(), Cursor { row: 4, col: 70 });
    }

    #[test]
    fn test_split_feed_matches_single_feed() {
        let mut whole = Terminal::new(80, 24);
        whole.feed(LOGIN_FRAME);

        let mut split = Terminal::new(80, 24);
        for chunk in LOGIN_FRAME.chunks(7) {
            split.feed(chunk);
        }

        assert_eq!(whole.to_grid(), split.to_grid());
    }

    #[test]
    fn test_cursor_stays_in_bounds_for_recognized_sequences() {
        let sequences: [&[u8]; 8] = [
            b"\x1b[200B",
            b"\x1b[200C",
            b"\x1b[300;300H",
            b"\x1b[0;0H\x1b[5A\x1b[5D",
            b"\x1b[100E",
            b"\x1b[90G\x1b[90d",
            b"\t\t\t\t\t\t\t\t\t\t\t\t",
            b"\x1b[24;80Hxyz\x1bM\x1bD\x1bE",
        ];

        let mut term = Terminal::new(80, 24);
        for round in 0..3 {
            for seq in sequences.iter() {
                term.feed(seq);
                let cursor = term.cursor();
                assert!(cursor.row < 24, "row {} in round {}", cursor.row, round);
                assert!(cursor.col < 80, "col {} in round {}", cursor.col, round);
            }
        }
    }

    #[test]
    fn test_utf8_title_stays_off_screen() {
        let mut term = Terminal::new(10, 1);
        term.feed("\x1b]0;tïtlé\x07ok".as_bytes());
        assert_eq!(term.display()[0], "ok        ");
    }

    #[test]
    fn test_utf8_is_decoded() {
        let mut term = Terminal::new(10, 1);
        term.feed("a·b".as_bytes());
        assert!(term.display()[0].starts_with("a·b"));
    }
}
