use std::io::{BufRead, Read, Result, Write};

use crate::BitArray;

/// Amount of words that are (de)serialized at once
const WORDS_PER_CHUNK: usize = 1024;

pub trait Binary {
    fn write_binary<W: Write>(&self, writer: W) -> Result<()>;
    fn read_binary<R: BufRead>(&mut self, reader: R) -> Result<()>;
}

impl Binary for BitArray {
    /// Writes the packed words in little endian order, the length and width are not written
    fn write_binary<W: Write>(&self, mut writer: W) -> Result<()> {
        let mut buffer = Vec::with_capacity(WORDS_PER_CHUNK * 8);
        for chunk in self.data.chunks(WORDS_PER_CHUNK) {
            buffer.clear();
            chunk.iter().for_each(|word| buffer.extend_from_slice(&word.to_le_bytes()));
            writer.write_all(&buffer)?;
        }

        Ok(())
    }

    /// Fills the words of an array created with `with_capacity`.
    /// Fails with `UnexpectedEof` when the reader holds fewer words than the array needs.
    fn read_binary<R: BufRead>(&mut self, mut reader: R) -> Result<()> {
        let mut buffer = [0_u8; WORDS_PER_CHUNK * 8];
        for chunk in self.data.chunks_mut(WORDS_PER_CHUNK) {
            let bytes = &mut buffer[..chunk.len() * 8];
            reader.read_exact(bytes)?;
            for (word, word_bytes) in chunk.iter_mut().zip(bytes.chunks_exact(8)) {
                let mut le_bytes = [0_u8; 8];
                le_bytes.copy_from_slice(word_bytes);
                *word = u64::from_le_bytes(le_bytes);
            }
        }

        Ok(())
    }
}
