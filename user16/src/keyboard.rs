//! Keyboard Layouts
//!
//! Virtual key to character translation used by `translate_message`, and
//! the accent table that composes a dead key with the following letter.

use std::collections::BTreeMap;

use crate::input::vk;

/// Result of translating one key press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToAscii {
    /// Key produces no character
    None,
    Char(u8),
    /// Accent waiting for the next character
    Dead(u8),
}

/// Keyboard driver collaborator
pub trait KeyboardLayout: Send + Sync {
    /// Translate `key` given a key state table (0x80 down, 0x01 toggled)
    fn to_ascii(&self, key: u8, scancode: u16, state: &[u8; 256]) -> ToAscii;
}

fn down(state: &[u8; 256], key: u8) -> bool {
    state[key as usize] & 0x80 != 0
}

fn toggled(state: &[u8; 256], key: u8) -> bool {
    state[key as usize] & 0x01 != 0
}

/// Shifted forms of the digit row, '0' first
const SHIFTED_DIGITS: &[u8; 10] = b")!@#$%^&*(";

fn us_char(key: u8, shift: bool) -> Option<u8> {
    let pair = |plain: u8, shifted: u8| Some(if shift { shifted } else { plain });
    match key {
        b'0'..=b'9' => pair(key, SHIFTED_DIGITS[(key - b'0') as usize]),
        vk::SPACE => Some(b' '),
        vk::RETURN => Some(b'\r'),
        vk::BACK => Some(0x08),
        vk::TAB => Some(b'\t'),
        vk::ESCAPE => Some(0x1B),
        vk::OEM_1 => pair(b';', b':'),
        vk::OEM_PLUS => pair(b'=', b'+'),
        vk::OEM_COMMA => pair(b',', b'<'),
        vk::OEM_MINUS => pair(b'-', b'_'),
        vk::OEM_PERIOD => pair(b'.', b'>'),
        vk::OEM_2 => pair(b'/', b'?'),
        vk::OEM_3 => pair(b'`', b'~'),
        vk::OEM_4 => pair(b'[', b'{'),
        vk::OEM_5 => pair(b'\\', b'|'),
        vk::OEM_6 => pair(b']', b'}'),
        vk::OEM_7 => pair(b'\'', b'"'),
        vk::MULTIPLY => Some(b'*'),
        vk::ADD => Some(b'+'),
        vk::SUBTRACT => Some(b'-'),
        vk::DIVIDE => Some(b'/'),
        _ => None,
    }
}

fn translate(key: u8, state: &[u8; 256], dead_keys: bool) -> ToAscii {
    let shift = down(state, vk::SHIFT);
    let ctrl = down(state, vk::CONTROL);
    let alt = down(state, vk::MENU);

    if key.is_ascii_uppercase() {
        if ctrl && !alt {
            return ToAscii::Char(key - b'A' + 1);
        }
        let upper = shift != toggled(state, vk::CAPITAL);
        return ToAscii::Char(if upper { key } else { key.to_ascii_lowercase() });
    }
    if (vk::NUMPAD0..=vk::NUMPAD9).contains(&key) {
        return if toggled(state, vk::NUMLOCK) {
            ToAscii::Char(b'0' + (key - vk::NUMPAD0))
        } else {
            ToAscii::None
        };
    }
    if key == vk::DECIMAL {
        return if toggled(state, vk::NUMLOCK) { ToAscii::Char(b'.') } else { ToAscii::None };
    }

    if dead_keys && !ctrl {
        // US-International accents
        match (key, shift) {
            (vk::OEM_7, false) => return ToAscii::Dead(0xB4),
            (vk::OEM_7, true) => return ToAscii::Dead(0xA8),
            (vk::OEM_3, false) => return ToAscii::Dead(b'`'),
            (vk::OEM_3, true) => return ToAscii::Dead(b'~'),
            (b'6', true) => return ToAscii::Dead(b'^'),
            _ => {}
        }
    }

    if ctrl && !alt {
        return match key {
            vk::OEM_4 => ToAscii::Char(0x1B),
            vk::OEM_5 => ToAscii::Char(0x1C),
            vk::OEM_6 => ToAscii::Char(0x1D),
            vk::RETURN => ToAscii::Char(b'\n'),
            vk::BACK => ToAscii::Char(0x7F),
            vk::SPACE => ToAscii::Char(b' '),
            _ => ToAscii::None,
        };
    }

    us_char(key, shift).map_or(ToAscii::None, ToAscii::Char)
}

/// US English layout
#[derive(Debug, Clone, Copy, Default)]
pub struct UsLayout;

impl KeyboardLayout for UsLayout {
    fn to_ascii(&self, key: u8, _scancode: u16, state: &[u8; 256]) -> ToAscii {
        translate(key, state, false)
    }
}

/// US-International: quote, grave, tilde and caret are dead keys
#[derive(Debug, Clone, Copy, Default)]
pub struct UsInternational;

impl KeyboardLayout for UsInternational {
    fn to_ascii(&self, key: u8, _scancode: u16, state: &[u8; 256]) -> ToAscii {
        translate(key, state, true)
    }
}

// ============================================================================
// Accent Composition
// ============================================================================

/// (accent, base, composed) in Latin-1
const ACCENTS: &[(u8, u8, u8)] = &[
    (b'`', b'A', 0xC0), (b'`', b'a', 0xE0),
    (b'\'', b'A', 0xC1), (b'\'', b'a', 0xE1),
    (b'^', b'A', 0xC2), (b'^', b'a', 0xE2),
    (b'~', b'A', 0xC3), (b'~', b'a', 0xE3),
    (b'"', b'A', 0xC4), (b'"', b'a', 0xE4),
    (b'O', b'A', 0xC5), (b'o', b'a', 0xE5),
    (b'0', b'A', 0xC5), (b'0', b'a', 0xE5),
    (b'A', b'A', 0xC5), (b'a', b'a', 0xE5),
    (b'A', b'E', 0xC6), (b'a', b'e', 0xE6),
    (b',', b'C', 0xC7), (b',', b'c', 0xE7),
    (b'`', b'E', 0xC8), (b'`', b'e', 0xE8),
    (b'\'', b'E', 0xC9), (b'\'', b'e', 0xE9),
    (b'^', b'E', 0xCA), (b'^', b'e', 0xEA),
    (b'"', b'E', 0xCB), (b'"', b'e', 0xEB),
    (b'`', b'I', 0xCC), (b'`', b'i', 0xEC),
    (b'\'', b'I', 0xCD), (b'\'', b'i', 0xED),
    (b'^', b'I', 0xCE), (b'^', b'i', 0xEE),
    (b'"', b'I', 0xCF), (b'"', b'i', 0xEF),
    (b'-', b'D', 0xD0), (b'-', b'd', 0xF0),
    (b'~', b'N', 0xD1), (b'~', b'n', 0xF1),
    (b'`', b'O', 0xD2), (b'`', b'o', 0xF2),
    (b'\'', b'O', 0xD3), (b'\'', b'o', 0xF3),
    (b'^', b'O', 0xD4), (b'^', b'o', 0xF4),
    (b'~', b'O', 0xD5), (b'~', b'o', 0xF5),
    (b'"', b'O', 0xD6), (b'"', b'o', 0xF6),
    (b'/', b'O', 0xD8), (b'/', b'o', 0xF8),
    (b'`', b'U', 0xD9), (b'`', b'u', 0xF9),
    (b'\'', b'U', 0xDA), (b'\'', b'u', 0xFA),
    (b'^', b'U', 0xDB), (b'^', b'u', 0xFB),
    (b'"', b'U', 0xDC), (b'"', b'u', 0xFC),
    (b'\'', b'Y', 0xDD), (b'\'', b'y', 0xFD),
    (b'T', b'H', 0xDE), (b't', b'h', 0xFE),
    (b's', b's', 0xDF), (b'"', b'y', 0xFF),
    (b's', b'z', 0xDF), (b'i', b'j', 0xFF),
];

/// Dead-key composition table
#[derive(Debug, Clone)]
pub struct AccentTable {
    map: BTreeMap<(u8, u8), u8>,
}

impl Default for AccentTable {
    fn default() -> Self {
        Self::new()
    }
}

impl AccentTable {
    pub fn new() -> Self {
        let mut map = BTreeMap::new();
        for &(accent, base, composed) in ACCENTS {
            map.entry((accent, base)).or_insert(composed);
        }
        Self { map }
    }

    /// Compose `base` with a pending dead key. Diaeresis (0xA8) and acute
    /// (0xB4) look up as '"' and '\''.
    pub fn compose(&self, accent: u8, base: u8) -> Option<u8> {
        let accent = match accent {
            0xA8 => b'"',
            0xB4 => b'\'',
            other => other,
        };
        self.map.get(&(accent, base)).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(keys: &[(u8, u8)]) -> [u8; 256] {
        let mut table = [0u8; 256];
        for &(key, value) in keys {
            table[key as usize] = value;
        }
        table
    }

    #[test]
    fn letters_follow_shift_and_caps() {
        let us = UsLayout;
        assert_eq!(us.to_ascii(b'A', 0x1E, &state(&[])), ToAscii::Char(b'a'));
        assert_eq!(us.to_ascii(b'A', 0x1E, &state(&[(vk::SHIFT, 0x80)])), ToAscii::Char(b'A'));
        assert_eq!(us.to_ascii(b'A', 0x1E, &state(&[(vk::CAPITAL, 0x01)])), ToAscii::Char(b'A'));
        assert_eq!(
            us.to_ascii(b'A', 0x1E, &state(&[(vk::CAPITAL, 0x01), (vk::SHIFT, 0x80)])),
            ToAscii::Char(b'a')
        );
        assert_eq!(us.to_ascii(b'C', 0x2E, &state(&[(vk::CONTROL, 0x80)])), ToAscii::Char(3));
    }

    #[test]
    fn digits_punctuation_and_non_characters() {
        let us = UsLayout;
        let shift = state(&[(vk::SHIFT, 0x80)]);
        assert_eq!(us.to_ascii(b'2', 0x03, &state(&[])), ToAscii::Char(b'2'));
        assert_eq!(us.to_ascii(b'2', 0x03, &shift), ToAscii::Char(b'@'));
        assert_eq!(us.to_ascii(vk::OEM_7, 0x28, &shift), ToAscii::Char(b'"'));
        assert_eq!(us.to_ascii(vk::F1, 0x3B, &state(&[])), ToAscii::None);
        assert_eq!(us.to_ascii(vk::SHIFT, 0x2A, &shift), ToAscii::None);
        assert_eq!(us.to_ascii(vk::NUMPAD0 + 5, 0x4C, &state(&[])), ToAscii::None);
        assert_eq!(
            us.to_ascii(vk::NUMPAD0 + 5, 0x4C, &state(&[(vk::NUMLOCK, 0x01)])),
            ToAscii::Char(b'5')
        );
    }

    #[test]
    fn international_dead_keys() {
        let intl = UsInternational;
        let shift = state(&[(vk::SHIFT, 0x80)]);
        assert_eq!(intl.to_ascii(vk::OEM_7, 0x28, &state(&[])), ToAscii::Dead(0xB4));
        assert_eq!(intl.to_ascii(vk::OEM_7, 0x28, &shift), ToAscii::Dead(0xA8));
        assert_eq!(intl.to_ascii(b'6', 0x07, &shift), ToAscii::Dead(b'^'));
        assert_eq!(intl.to_ascii(b'6', 0x07, &state(&[])), ToAscii::Char(b'6'));
    }

    #[test]
    fn accent_composition() {
        let table = AccentTable::new();
        assert_eq!(table.compose(0xB4, b'e'), Some(0xE9));
        assert_eq!(table.compose(0xA8, b'u'), Some(0xFC));
        assert_eq!(table.compose(b'^', b'O'), Some(0xD4));
        assert_eq!(table.compose(b's', b's'), Some(0xDF));
        assert_eq!(table.compose(b'`', b'x'), None);
    }
}
