//! Multi-valued logic and its binary-string encoding.
//!
//! A logic vector travels across the upper boundary as a string with one
//! character per bit, most significant first.

use crate::error::{GpiError, Result};

/// One bit of nine-valued logic. The four SystemVerilog states are a
/// subset; VHDL `std_logic` uses all nine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Logic {
    U,
    X,
    Zero,
    One,
    Z,
    W,
    L,
    H,
    DontCare,
}

impl Logic {
    /// Parse one binary-string character. Lower-case letters are accepted.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '0' => Some(Self::Zero),
            '1' => Some(Self::One),
            'X' | 'x' => Some(Self::X),
            'Z' | 'z' => Some(Self::Z),
            'U' | 'u' => Some(Self::U),
            'W' | 'w' => Some(Self::W),
            'L' | 'l' => Some(Self::L),
            'H' | 'h' => Some(Self::H),
            '-' => Some(Self::DontCare),
            _ => None,
        }
    }

    pub fn to_char(self) -> char {
        match self {
            Self::U => 'U',
            Self::X => 'X',
            Self::Zero => '0',
            Self::One => '1',
            Self::Z => 'Z',
            Self::W => 'W',
            Self::L => 'L',
            Self::H => 'H',
            Self::DontCare => '-',
        }
    }

    /// Position in the `std_logic` enumeration.
    pub fn std_logic_pos(self) -> u8 {
        match self {
            Self::U => 0,
            Self::X => 1,
            Self::Zero => 2,
            Self::One => 3,
            Self::Z => 4,
            Self::W => 5,
            Self::L => 6,
            Self::H => 7,
            Self::DontCare => 8,
        }
    }

    pub fn from_std_logic_pos(pos: u8) -> Option<Self> {
        match pos {
            0 => Some(Self::U),
            1 => Some(Self::X),
            2 => Some(Self::Zero),
            3 => Some(Self::One),
            4 => Some(Self::Z),
            5 => Some(Self::W),
            6 => Some(Self::L),
            7 => Some(Self::H),
            8 => Some(Self::DontCare),
            _ => None,
        }
    }

    /// `0` or `1`.
    pub fn is_definite(self) -> bool {
        matches!(self, Self::Zero | Self::One)
    }
}

/// Parse a binary string into logic values.
pub fn parse_binstr(s: &str) -> Result<Vec<Logic>> {
    s.chars()
        .map(|c| {
            Logic::from_char(c).ok_or_else(|| {
                GpiError::invalid_value(format!("'{c}' is not a logic character in \"{s}\""))
            })
        })
        .collect()
}

pub fn format_binstr(bits: &[Logic]) -> String {
    bits.iter().map(|b| b.to_char()).collect()
}

/// Check a binary string against the target width.
pub fn check_binstr(s: &str, width: usize) -> Result<()> {
    let len = s.chars().count();
    if len != width {
        return Err(GpiError::invalid_value(format!(
            "binary string of length {len} written to object of width {width}"
        )));
    }
    parse_binstr(s).map(|_| ())
}

/// Decompose an integer into `width` definite bits, MSB first.
///
/// Bits above 63 repeat the sign bit. No unknown or high-impedance state
/// can be produced through this path.
pub fn int_to_binstr(value: i64, width: usize) -> String {
    (0..width)
        .rev()
        .map(|bit| {
            let set = if bit >= 64 {
                value < 0
            } else {
                (value >> bit) & 1 == 1
            };
            if set {
                '1'
            } else {
                '0'
            }
        })
        .collect()
}

/// Fold a binary string into an integer, keeping the low 64 bits.
///
/// Fails when any bit is not a definite state (`L`/`H` count as definite
/// weak levels here).
pub fn binstr_to_int(s: &str) -> Result<i64> {
    let mut acc: u64 = 0;
    for c in s.chars() {
        let bit = match Logic::from_char(c) {
            Some(Logic::Zero | Logic::L) => 0,
            Some(Logic::One | Logic::H) => 1,
            _ => {
                return Err(GpiError::invalid_value(format!(
                    "\"{s}\" has no integer value"
                )))
            }
        };
        acc = (acc << 1) | bit;
    }
    Ok(acc as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chars_round_trip() {
        for c in "UX01ZWLH-".chars() {
            assert_eq!(Logic::from_char(c).unwrap().to_char(), c);
        }
        assert_eq!(Logic::from_char('x'), Some(Logic::X));
        assert_eq!(Logic::from_char('2'), None);
    }

    #[test]
    fn std_logic_positions() {
        for pos in 0..9 {
            assert_eq!(Logic::from_std_logic_pos(pos).unwrap().std_logic_pos(), pos);
        }
        assert_eq!(Logic::from_std_logic_pos(9), None);
    }

    #[test]
    fn int_decomposition_is_msb_first() {
        assert_eq!(int_to_binstr(5, 4), "0101");
        assert_eq!(int_to_binstr(0xff, 4), "1111");
        assert_eq!(int_to_binstr(-1, 70), "1".repeat(70));
        assert_eq!(int_to_binstr(1, 70).len(), 70);
        assert!(int_to_binstr(1, 70).starts_with('0'));
    }

    #[test]
    fn int_path_only_definite() {
        for v in [0_i64, 1, 0x55, -3] {
            assert!(int_to_binstr(v, 12)
                .chars()
                .all(|c| Logic::from_char(c).unwrap().is_definite()));
        }
    }

    #[test]
    fn fold_to_int() {
        assert_eq!(binstr_to_int("0101").unwrap(), 5);
        assert_eq!(binstr_to_int("HL").unwrap(), 2);
        assert!(binstr_to_int("01X1").is_err());
        assert_eq!(binstr_to_int(&int_to_binstr(-2, 64)).unwrap(), -2);
    }

    #[test]
    fn width_check() {
        assert!(check_binstr("01XZ", 4).is_ok());
        assert!(check_binstr("01X", 4).is_err());
        assert!(check_binstr("01Q0", 4).is_err());
    }
}
