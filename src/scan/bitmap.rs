use serde::Serialize;

/// Changed blocks of one segment file.
///
/// Bit `n` (segment-relative block `n`) lives in byte `n / 8` at bit
/// position `n % 8`, least significant bit first. The byte vector is only as
/// long as the highest set bit requires.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeBitmap {
    pub path: String,
    bits: Vec<u8>,
}

impl ChangeBitmap {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            bits: Vec::new(),
        }
    }

    pub fn set(&mut self, block: u32) {
        let idx = (block / 8) as usize;
        if idx >= self.bits.len() {
            self.bits.resize(idx + 1, 0);
        }
        self.bits[idx] |= 1 << (block % 8);
    }

    pub fn is_set(&self, block: u32) -> bool {
        self.bits
            .get((block / 8) as usize)
            .is_some_and(|byte| byte & (1 << (block % 8)) != 0)
    }

    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|b| *b == 0)
    }

    pub fn count(&self) -> usize {
        self.bits.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Set block offsets in ascending order.
    pub fn blocks(&self) -> impl Iterator<Item = u32> + '_ {
        self.bits.iter().enumerate().flat_map(|(idx, byte)| {
            (0..8u32)
                .filter(move |bit| (*byte >> *bit) & 1 == 1)
                .map(move |bit| idx as u32 * 8 + bit)
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    pub fn into_parts(self) -> (String, Vec<u8>) {
        (self.path, self.bits)
    }
}
