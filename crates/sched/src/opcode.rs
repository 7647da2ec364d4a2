//! Rowop opcodes.
//!
//! An opcode is a bitmask rather than a closed enum: bit 0 marks an insert,
//! bit 1 a delete. Zero is a no-op. Unknown bits are carried through untouched
//! so that newer producers can pass codes through older consumers.

use core::fmt;

/// Classifies a rowop as insert and/or delete.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Opcode(u8);

impl Opcode {
    /// Bit marking an insert.
    pub const FLAG_INSERT: u8 = 0x01;
    /// Bit marking a delete.
    pub const FLAG_DELETE: u8 = 0x02;

    /// No operation.
    pub const NOP: Opcode = Opcode(0);
    /// Insert a row.
    pub const INSERT: Opcode = Opcode(Self::FLAG_INSERT);
    /// Delete a row.
    pub const DELETE: Opcode = Opcode(Self::FLAG_DELETE);

    /// Creates an opcode from raw bits, keeping unknown ones.
    #[inline]
    pub const fn from_bits(bits: u8) -> Self {
        Opcode(bits)
    }

    /// Returns the raw bits.
    #[inline]
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Returns true if the insert bit is set.
    #[inline]
    pub const fn is_insert(&self) -> bool {
        self.0 & Self::FLAG_INSERT != 0
    }

    /// Returns true if the delete bit is set.
    #[inline]
    pub const fn is_delete(&self) -> bool {
        self.0 & Self::FLAG_DELETE != 0
    }

    /// Returns true if neither the insert nor the delete bit is set.
    #[inline]
    pub const fn is_nop(&self) -> bool {
        self.0 & (Self::FLAG_INSERT | Self::FLAG_DELETE) == 0
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let known = Self::FLAG_INSERT | Self::FLAG_DELETE;
        let extra = self.0 & !known;
        match (self.is_insert(), self.is_delete(), extra) {
            (false, false, 0) => f.write_str("NOP"),
            (true, false, 0) => f.write_str("INSERT"),
            (false, true, 0) => f.write_str("DELETE"),
            (ins, del, extra) => {
                let mut sep = "";
                f.write_str("[")?;
                if ins {
                    f.write_str("INSERT")?;
                    sep = "|";
                }
                if del {
                    write!(f, "{}DELETE", sep)?;
                    sep = "|";
                }
                if extra != 0 {
                    write!(f, "{}0x{:02x}", sep, extra)?;
                }
                f.write_str("]")
            }
        }
    }
}

impl fmt::Debug for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_flags() {
        assert!(Opcode::INSERT.is_insert());
        assert!(!Opcode::INSERT.is_delete());
        assert!(Opcode::DELETE.is_delete());
        assert!(Opcode::NOP.is_nop());
        assert!(!Opcode::DELETE.is_nop());
    }

    #[test]
    fn test_future_bits_preserved() {
        let op = Opcode::from_bits(0x05);
        assert!(op.is_insert());
        assert!(!op.is_delete());
        assert_eq!(op.bits(), 0x05);

        // only unknown bits: still a no-op for table logic
        assert!(Opcode::from_bits(0x04).is_nop());
    }

    #[test]
    fn test_display() {
        assert_eq!(Opcode::NOP.to_string(), "NOP");
        assert_eq!(Opcode::INSERT.to_string(), "INSERT");
        assert_eq!(Opcode::DELETE.to_string(), "DELETE");
        assert_eq!(Opcode::from_bits(3).to_string(), "[INSERT|DELETE]");
        assert_eq!(Opcode::from_bits(0x06).to_string(), "[DELETE|0x04]");
        assert_eq!(Opcode::from_bits(0x08).to_string(), "[0x08]");
    }
}
