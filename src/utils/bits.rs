use crate::error::{HwDecError, Result};

/// MSB-first bit reader over an RBSP, with the Exp-Golomb codes H.264
/// parameter sets are written in.
///
/// ```
/// use hwvdec::utils::BitReader;
///
/// let data = [0b1011_0011];
/// let mut reader = BitReader::new(&data);
///
/// assert_eq!(reader.read_flag().unwrap(), true);
/// assert_eq!(reader.read_bits(3).unwrap(), 0b011);
/// ```
pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    /// Creates a reader positioned at the first bit of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        BitReader { data, pos: 0 }
    }

    /// Reads one bit.
    pub fn read_flag(&mut self) -> Result<bool> {
        let byte = self
            .data
            .get(self.pos / 8)
            .ok_or_else(|| HwDecError::Parser("read past end of bitstream".into()))?;
        let bit = (byte >> (7 - self.pos % 8)) & 1;
        self.pos += 1;
        Ok(bit == 1)
    }

    /// Reads `n` bits, big-endian. `n` may not exceed 32.
    pub fn read_bits(&mut self, n: u32) -> Result<u32> {
        if n > 32 {
            return Err(HwDecError::Parser(format!("cannot read {} bits at once", n)));
        }
        let mut value = 0u64;
        for _ in 0..n {
            value = (value << 1) | self.read_flag()? as u64;
        }
        Ok(value as u32)
    }

    /// Skips `n` bits.
    pub fn skip_bits(&mut self, n: usize) -> Result<()> {
        if self.pos + n > self.data.len() * 8 {
            return Err(HwDecError::Parser("skip past end of bitstream".into()));
        }
        self.pos += n;
        Ok(())
    }

    /// Reads an unsigned Exp-Golomb code, ue(v).
    pub fn read_ue(&mut self) -> Result<u32> {
        let mut leading_zeros = 0;
        while !self.read_flag()? {
            leading_zeros += 1;
            if leading_zeros > 31 {
                return Err(HwDecError::Parser("Exp-Golomb code too long".into()));
            }
        }
        if leading_zeros == 0 {
            return Ok(0);
        }
        let info = self.read_bits(leading_zeros)?;
        Ok(((1u64 << leading_zeros) + info as u64 - 1) as u32)
    }

    /// Reads a signed Exp-Golomb code, se(v). Odd codes are positive.
    pub fn read_se(&mut self) -> Result<i32> {
        let k = self.read_ue()?;
        let magnitude = ((k as i64 + 1) >> 1) as i32;
        Ok(if k & 1 == 1 { magnitude } else { -magnitude })
    }

    /// Skips one ue(v).
    pub fn skip_ue(&mut self) -> Result<()> {
        self.read_ue().map(|_| ())
    }

    /// Bits left to read.
    pub fn remaining_bits(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.pos)
    }
}

/// Strips emulation-prevention bytes (`00 00 03` -> `00 00`) from a NAL.
pub fn unescape_rbsp(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut zeros = 0;
    for &byte in data {
        if zeros >= 2 && byte == 0x03 {
            zeros = 0;
            continue;
        }
        zeros = if byte == 0 { zeros + 1 } else { 0 };
        out.push(byte);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quickcheck_macros::quickcheck;

    #[test]
    fn reads_across_bytes() {
        let data = [0b1011_0011, 0b0101_1010];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
        assert_eq!(reader.read_bits(8).unwrap(), 0b1001_1010);
        assert_eq!(reader.remaining_bits(), 5);
        assert_eq!(reader.read_bits(0).unwrap(), 0);
        assert!(reader.read_bits(33).is_err());
        assert!(reader.skip_bits(6).is_err());
        reader.skip_bits(5).unwrap();
        assert!(reader.read_flag().is_err());
    }

    #[test]
    fn exp_golomb_codes() {
        // 1 | 010 | 011 | 00100 | 00111 -> 0, 1, 2, 3, 6
        let data = [0b1010_0110, 0b0100_0011, 0b1000_0000];
        let mut reader = BitReader::new(&data);
        let values: Vec<u32> = (0..5).map(|_| reader.read_ue().unwrap()).collect();
        assert_eq!(values, vec![0, 1, 2, 3, 6]);

        let mut reader = BitReader::new(&data);
        let values: Vec<i32> = (0..5).map(|_| reader.read_se().unwrap()).collect();
        assert_eq!(values, vec![0, 1, -1, 2, -3]);

        assert!(BitReader::new(&[0u8; 5]).read_ue().is_err());
    }

    #[test]
    fn strips_emulation_prevention() {
        assert_eq!(
            unescape_rbsp(&[0x67, 0x00, 0x00, 0x03, 0x01, 0x00, 0x00, 0x03, 0x00, 0x03]),
            vec![0x67, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x03]
        );
    }

    #[quickcheck]
    fn read_bits_matches_manual(data: Vec<u8>, n: u8) -> bool {
        let n = (n % 33) as usize;
        let mut reader = BitReader::new(&data);
        match reader.read_bits(n as u32) {
            Ok(value) => {
                let mut expected = 0u64;
                for i in 0..n {
                    expected = (expected << 1) | ((data[i / 8] >> (7 - i % 8)) & 1) as u64;
                }
                value as u64 == expected
            }
            Err(_) => n > data.len() * 8,
        }
    }
}
