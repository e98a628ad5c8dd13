//! The two device families this wire format is shared between.
//!
//! The command bytes are identical; only the raster-line tag letter and the
//! endianness of its length prefix differ.

/// Byte order of a raster line's 16-bit length prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// Which device family a job targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Series {
    /// P-touch label printers: little-endian length, `'G'` tag.
    Pt,
    /// QL label printers: big-endian length, `'g'` tag.
    Ql,
}

impl Series {
    pub fn length_endian(self) -> Endian {
        match self {
            Series::Pt => Endian::Little,
            Series::Ql => Endian::Big,
        }
    }

    /// The tag byte used for a compressed or uncompressed-via-framing raster line.
    pub fn raster_letter(self) -> u8 {
        match self {
            Series::Pt => b'G',
            Series::Ql => b'g',
        }
    }
}

/// Write a 16-bit length in the endianness dictated by `endian`.
pub fn write_u16(endian: Endian, value: u16, out: &mut Vec<u8>) {
    match endian {
        Endian::Little => out.extend_from_slice(&value.to_le_bytes()),
        Endian::Big => out.extend_from_slice(&value.to_be_bytes()),
    }
}

/// Read a 16-bit length in the endianness dictated by `endian`.
pub fn read_u16(endian: Endian, bytes: [u8; 2]) -> u16 {
    match endian {
        Endian::Little => u16::from_le_bytes(bytes),
        Endian::Big => u16::from_be_bytes(bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pt_is_little_endian_g_uppercase() {
        assert_eq!(Series::Pt.length_endian(), Endian::Little);
        assert_eq!(Series::Pt.raster_letter(), b'G');
    }

    #[test]
    fn ql_is_big_endian_g_lowercase() {
        assert_eq!(Series::Ql.length_endian(), Endian::Big);
        assert_eq!(Series::Ql.raster_letter(), b'g');
    }

    #[test]
    fn u16_round_trip_both_endians() {
        for endian in [Endian::Little, Endian::Big] {
            let mut buf = Vec::new();
            write_u16(endian, 0x1234, &mut buf);
            let bytes: [u8; 2] = buf.try_into().unwrap();
            assert_eq!(read_u16(endian, bytes), 0x1234);
        }
    }
}
