//! A fixed-width integer array that stores every value with exactly `bits_per_value` bits,
//! packed back to back in a vector of `u64` words.

pub mod binary;

/// Array of `len` unsigned integers, each stored using `bits_per_value` bits.
///
/// Values are laid out most significant bit first: value `i` occupies the bit range
/// `[i * bits_per_value, (i + 1) * bits_per_value)`, counting from the most significant bit of
/// the first word. A value may straddle two consecutive words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitArray {
    data: Vec<u64>,
    mask: u64,
    len: usize,
    bits_per_value: usize,
}

impl BitArray {
    /// Creates a zero-filled array that can hold `capacity` values of `bits_per_value` bits
    ///
    /// # Panics
    ///
    /// Panics if `bits_per_value` is not in `1..=64`
    pub fn with_capacity(capacity: usize, bits_per_value: usize) -> Self {
        assert!(
            (1..=64).contains(&bits_per_value),
            "bits_per_value must be between 1 and 64, got {bits_per_value}"
        );

        Self {
            data: vec![0; Self::words_needed(capacity, bits_per_value)],
            mask: Self::mask_for(bits_per_value),
            len: capacity,
            bits_per_value,
        }
    }

    /// Returns how many `u64` words are needed to store `len` values of `bits_per_value` bits
    pub fn words_needed(len: usize, bits_per_value: usize) -> usize {
        (len * bits_per_value).div_ceil(64)
    }

    /// Returns the smallest amount of bits that can represent `max_value`
    pub fn bits_needed(max_value: u64) -> usize {
        (u64::BITS - max_value.leading_zeros()).max(1) as usize
    }

    fn mask_for(bits_per_value: usize) -> u64 {
        if bits_per_value == 64 {
            u64::MAX
        } else {
            (1 << bits_per_value) - 1
        }
    }

    /// Returns the value at `index`
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds
    pub fn get(&self, index: usize) -> u64 {
        assert!(index < self.len, "index {index} out of bounds for length {}", self.len);

        let start_bit = index * self.bits_per_value;
        let start_block = start_bit / 64;
        let start_block_offset = start_bit % 64;

        // the value is entirely contained in one block
        if start_block_offset + self.bits_per_value <= 64 {
            return self.data[start_block] >> (64 - start_block_offset - self.bits_per_value)
                & self.mask;
        }

        // the value is split over two blocks, end_block_offset is the amount of bits in the second block
        let end_block_offset = start_block_offset + self.bits_per_value - 64;

        let high = self.data[start_block] << end_block_offset;
        let low = self.data[start_block + 1] >> (64 - end_block_offset);

        (high | low) & self.mask
    }

    /// Stores `value` at `index`, bits of `value` above `bits_per_value` are ignored
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds
    pub fn set(&mut self, index: usize, value: u64) {
        assert!(index < self.len, "index {index} out of bounds for length {}", self.len);

        let value = value & self.mask;
        let start_bit = index * self.bits_per_value;
        let start_block = start_bit / 64;
        let start_block_offset = start_bit % 64;

        if start_block_offset + self.bits_per_value <= 64 {
            let shift = 64 - start_block_offset - self.bits_per_value;
            self.data[start_block] &= !(self.mask << shift);
            self.data[start_block] |= value << shift;
            return;
        }

        let end_block_offset = start_block_offset + self.bits_per_value - 64;

        // the low (64 - start_block_offset) bits of the first block hold the high part of the value
        self.data[start_block] &= !(u64::MAX >> start_block_offset);
        self.data[start_block] |= value >> end_block_offset;

        // the high end_block_offset bits of the second block hold the low part of the value
        self.data[start_block + 1] &= !(self.mask << (64 - end_block_offset));
        self.data[start_block + 1] |= value << (64 - end_block_offset);
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bits_per_value(&self) -> usize {
        self.bits_per_value
    }

    /// Size of the packed data in bytes
    pub fn heap_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<u64>()
    }

    /// Iterates over all stored values in order
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.len).map(|index| self.get(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitarray_with_capacity() {
        let bitarray = BitArray::with_capacity(4, 40);
        assert_eq!(bitarray.data, vec![0, 0, 0]);
        assert_eq!(bitarray.mask, 0xff_ffff_ffff);
        assert_eq!(bitarray.len(), 4);
        assert_eq!(bitarray.bits_per_value(), 40);
    }

    #[test]
    fn test_bitarray_get() {
        let mut bitarray = BitArray::with_capacity(4, 40);
        bitarray.data = vec![0x1cfac47f32c25261, 0x4dc9f34db6ba5108, 0x9144eb9ca32eb4a4];

        assert_eq!(bitarray.get(0), 0b0001110011111010110001000111111100110010);
        assert_eq!(bitarray.get(1), 0b1100001001010010011000010100110111001001);
        assert_eq!(bitarray.get(2), 0b1111001101001101101101101011101001010001);
        assert_eq!(bitarray.get(3), 0b0000100010010001010001001110101110011100);
    }

    #[test]
    fn test_bitarray_set() {
        let mut bitarray = BitArray::with_capacity(4, 40);

        bitarray.set(0, 0b0001110011111010110001000111111100110010);
        bitarray.set(1, 0b1100001001010010011000010100110111001001);
        bitarray.set(2, 0b1111001101001101101101101011101001010001);
        bitarray.set(3, 0b0000100010010001010001001110101110011100);

        assert_eq!(bitarray.data, vec![0x1cfac47f32c25261, 0x4dc9f34db6ba5108, 0x9144eb9c00000000]);
    }

    #[test]
    fn test_bitarray_overwrite_straddling_value() {
        let mut bitarray = BitArray::with_capacity(3, 40);
        bitarray.set(1, 0xff_ffff_ffff);
        bitarray.set(1, 0x12_3456_789a);
        bitarray.set(0, 0xab_cdef_0123);
        bitarray.set(2, 0x0f_0f0f_0f0f);

        assert_eq!(bitarray.get(0), 0xab_cdef_0123);
        assert_eq!(bitarray.get(1), 0x12_3456_789a);
        assert_eq!(bitarray.get(2), 0x0f_0f0f_0f0f);
    }

    #[test]
    fn test_bitarray_every_width() {
        for bits in 1..=64 {
            let mut bitarray = BitArray::with_capacity(130, bits);
            let mask = BitArray::mask_for(bits);
            let values: Vec<u64> = (0..130_u64)
                .map(|i| i.wrapping_mul(0x9e37_79b9_7f4a_7c15) & mask)
                .collect();

            for (index, &value) in values.iter().enumerate() {
                bitarray.set(index, value);
            }

            assert_eq!(bitarray.iter().collect::<Vec<u64>>(), values, "width {bits}");
        }
    }

    #[test]
    fn test_bits_needed() {
        assert_eq!(BitArray::bits_needed(0), 1);
        assert_eq!(BitArray::bits_needed(1), 1);
        assert_eq!(BitArray::bits_needed(2), 2);
        assert_eq!(BitArray::bits_needed(255), 8);
        assert_eq!(BitArray::bits_needed(256), 9);
        assert_eq!(BitArray::bits_needed(u64::MAX), 64);
    }

    #[test]
    #[should_panic]
    fn test_get_out_of_bounds() {
        let bitarray = BitArray::with_capacity(2, 7);
        bitarray.get(2);
    }
}
