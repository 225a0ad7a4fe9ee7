use std::fmt;

/// Displays bytes as space-separated hex, for `trace!` frame dumps.
pub struct HexDump<'a>(pub &'a [u8]);

impl fmt::Display for HexDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, byte) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_bytes() {
        assert_eq!(HexDump(&[0x04, 0xab, 0x00]).to_string(), "04 ab 00");
        assert_eq!(HexDump(&[]).to_string(), "");
    }
}
