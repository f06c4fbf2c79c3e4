//! Maps a suffix (a position in the concatenated input string) to the protein it falls in.

use std::io::{self, BufRead, Read, Write};

use clap::ValueEnum;
use get_size::GetSize;
use thiserror::Error;

use crate::proteins::{Protein, Proteins, SEPARATION_CHARACTER, TERMINATION_CHARACTER};

/// Marks a value that does not point to anything
pub trait Nullable<T> {
    /// The value used as null
    const NULL: T;

    /// Returns true if the value is the null value
    fn is_null(&self) -> bool;
}

impl Nullable<u32> for u32 {
    const NULL: u32 = u32::MAX;

    fn is_null(&self) -> bool {
        *self == Self::NULL
    }
}

/// Enum used to define the commandline arguments and choose which index style is used
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SuffixToProteinMappingStyle {
    /// One entry per position of the input string
    Dense,
    /// One entry per protein boundary
    #[default]
    Sparse,
}

impl SuffixToProteinMappingStyle {
    /// The tag that identifies the style in a binary index
    pub fn tag(self) -> u8 {
        match self {
            Self::Sparse => 0,
            Self::Dense => 1,
        }
    }

    /// Inverse of `tag`
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Sparse),
            1 => Some(Self::Dense),
            _ => None,
        }
    }
}

/// Errors that occur when a suffix can not be traced back to a protein
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    /// The offset points at a separator, past the input string, or at a protein that does not
    /// exist. This means the index and the proteins are out of sync.
    #[error("suffix {offset} does not belong to a protein")]
    InvalidOffset {
        /// The offending offset
        offset: i64,
    },
}

/// Retrieves the protein that contains a given suffix
pub trait SuffixToProteinIndex: Send + Sync {
    /// Returns the index of the protein that contains `suffix`, or `u32::NULL` when the suffix
    /// starts with a separation or termination character or lies outside the input string
    fn suffix_to_protein(&self, suffix: i64) -> u32;

    /// The style of this mapping
    fn style(&self) -> SuffixToProteinMappingStyle;

    /// The amount of entries stored by this mapping
    fn len(&self) -> usize;

    /// Returns true if the mapping holds no entries
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the mapping on the heap, in bytes
    fn heap_size(&self) -> usize;

    /// Writes the amount of entries, followed by the entries themselves in little endian order
    fn write_binary(&self, writer: &mut dyn Write) -> io::Result<()>;

    /// Returns the protein that contains `suffix`
    ///
    /// # Errors
    ///
    /// Returns `MappingError::InvalidOffset` if the suffix does not belong to any protein of
    /// `proteins`
    fn resolve<'a>(&self, proteins: &'a Proteins, suffix: i64) -> Result<&'a Protein, MappingError> {
        let protein_index = self.suffix_to_protein(suffix);
        if protein_index.is_null() {
            return Err(MappingError::InvalidOffset { offset: suffix });
        }

        proteins
            .proteins
            .get(protein_index as usize)
            .ok_or(MappingError::InvalidOffset { offset: suffix })
    }
}

/// Uses O(n) memory with n the size of the input text, but retrieval of the protein is in O(1)
#[derive(Debug, PartialEq, GetSize)]
pub struct DenseSuffixToProtein {
    // UniProt does not have more that u32::MAX proteins, so a larger type is not needed
    mapping: Vec<u32>,
}

/// Uses O(m) memory with m the number of proteins, but retrieval of the protein is O(log m)
#[derive(Debug, PartialEq, GetSize)]
pub struct SparseSuffixToProtein {
    // start of every protein, followed by the length of the text
    mapping: Vec<i64>,
}

impl SuffixToProteinIndex for DenseSuffixToProtein {
    fn suffix_to_protein(&self, suffix: i64) -> u32 {
        usize::try_from(suffix)
            .ok()
            .and_then(|suffix| self.mapping.get(suffix))
            .copied()
            .unwrap_or(u32::NULL)
    }

    fn style(&self) -> SuffixToProteinMappingStyle {
        SuffixToProteinMappingStyle::Dense
    }

    fn len(&self) -> usize {
        self.mapping.len()
    }

    fn heap_size(&self) -> usize {
        self.get_heap_size()
    }

    fn write_binary(&self, writer: &mut dyn Write) -> io::Result<()> {
        writer.write_all(&(self.mapping.len() as u64).to_le_bytes())?;
        for chunk in self.mapping.chunks(1 << 16) {
            let bytes: Vec<u8> = chunk.iter().flat_map(|value| value.to_le_bytes()).collect();
            writer.write_all(&bytes)?;
        }
        Ok(())
    }
}

impl SuffixToProteinIndex for SparseSuffixToProtein {
    fn suffix_to_protein(&self, suffix: i64) -> u32 {
        let text_length = self.mapping.last().copied().unwrap_or(0);
        if suffix < 0 || suffix >= text_length {
            return u32::NULL;
        }

        let protein_index = self.mapping.binary_search(&suffix).unwrap_or_else(|index| index - 1);
        // if the next value in the mapping is 1 larger than the current suffix, that means that
        // the current suffix starts with a SEPARATION_CHARACTER or TERMINATION_CHARACTER
        if self.mapping[protein_index + 1] == suffix + 1 {
            return u32::NULL;
        }
        protein_index as u32
    }

    fn style(&self) -> SuffixToProteinMappingStyle {
        SuffixToProteinMappingStyle::Sparse
    }

    fn len(&self) -> usize {
        self.mapping.len()
    }

    fn heap_size(&self) -> usize {
        self.get_heap_size()
    }

    fn write_binary(&self, writer: &mut dyn Write) -> io::Result<()> {
        writer.write_all(&(self.mapping.len() as u64).to_le_bytes())?;
        for chunk in self.mapping.chunks(1 << 16) {
            let bytes: Vec<u8> = chunk.iter().flat_map(|value| value.to_le_bytes()).collect();
            writer.write_all(&bytes)?;
        }
        Ok(())
    }
}

fn is_boundary(character: u8) -> bool {
    character == SEPARATION_CHARACTER || character == TERMINATION_CHARACTER
}

impl DenseSuffixToProtein {
    /// Creates the dense mapping for the given input string
    pub fn new(text: &[u8]) -> Self {
        let mut current_protein_index: u32 = 0;
        let mut mapping = Vec::with_capacity(text.len());
        for &character in text {
            if is_boundary(character) {
                current_protein_index += 1;
                mapping.push(u32::NULL);
            } else {
                mapping.push(current_protein_index);
            }
        }
        Self { mapping }
    }

    /// Reads a dense mapping written by `write_binary`, the mapping must cover exactly
    /// `text_length` positions
    ///
    /// # Errors
    ///
    /// Returns an `InvalidData` error if the amount of entries does not match the text, or an
    /// `UnexpectedEof` error if the reader is exhausted too early
    pub fn read_binary(reader: &mut dyn BufRead, text_length: usize) -> io::Result<Self> {
        let entries = read_entry_count(reader)?;
        if entries != text_length {
            return Err(invalid_data(format!(
                "dense mapping has {entries} entries for a text of length {text_length}"
            )));
        }

        let mut mapping = Vec::new();
        mapping.try_reserve_exact(entries).map_err(|_| invalid_data("dense mapping too large"))?;
        let mut buffer = [0_u8; 4];
        for _ in 0..entries {
            reader.read_exact(&mut buffer)?;
            mapping.push(u32::from_le_bytes(buffer));
        }

        Ok(Self { mapping })
    }
}

impl SparseSuffixToProtein {
    /// Creates the sparse mapping for the given input string
    pub fn new(text: &[u8]) -> Self {
        let mut mapping: Vec<i64> = vec![0];
        for (index, &character) in text.iter().enumerate() {
            if is_boundary(character) {
                mapping.push(index as i64 + 1);
            }
        }
        Self { mapping }
    }

    /// Reads a sparse mapping written by `write_binary`. The boundaries must start at 0, be
    /// strictly increasing and end at `text_length`.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidData` error if the boundaries are inconsistent, or an `UnexpectedEof`
    /// error if the reader is exhausted too early
    pub fn read_binary(reader: &mut dyn BufRead, text_length: usize) -> io::Result<Self> {
        let entries = read_entry_count(reader)?;
        if entries < 2 || entries > text_length + 1 {
            return Err(invalid_data(format!(
                "sparse mapping has {entries} entries for a text of length {text_length}"
            )));
        }

        let mut mapping = Vec::with_capacity(entries);
        let mut buffer = [0_u8; 8];
        for _ in 0..entries {
            reader.read_exact(&mut buffer)?;
            mapping.push(i64::from_le_bytes(buffer));
        }

        let increasing = mapping.windows(2).all(|pair| pair[0] < pair[1]);
        if mapping[0] != 0 || !increasing || mapping[entries - 1] != text_length as i64 {
            return Err(invalid_data("sparse mapping boundaries are inconsistent"));
        }

        Ok(Self { mapping })
    }
}

/// Builds the mapping of the given style for an input string
pub fn build_suffix_to_protein(
    style: SuffixToProteinMappingStyle,
    text: &[u8],
) -> Box<dyn SuffixToProteinIndex> {
    match style {
        SuffixToProteinMappingStyle::Dense => Box::new(DenseSuffixToProtein::new(text)),
        SuffixToProteinMappingStyle::Sparse => Box::new(SparseSuffixToProtein::new(text)),
    }
}

/// Reads a mapping of the given style that was written with `write_binary`
///
/// # Errors
///
/// Returns an io error if the mapping is truncated or does not fit a text of `text_length`
pub fn read_suffix_to_protein(
    style: SuffixToProteinMappingStyle,
    reader: &mut dyn BufRead,
    text_length: usize,
) -> io::Result<Box<dyn SuffixToProteinIndex>> {
    Ok(match style {
        SuffixToProteinMappingStyle::Dense => {
            Box::new(DenseSuffixToProtein::read_binary(reader, text_length)?)
        }
        SuffixToProteinMappingStyle::Sparse => {
            Box::new(SparseSuffixToProtein::read_binary(reader, text_length)?)
        }
    })
}

fn read_entry_count(reader: &mut dyn BufRead) -> io::Result<usize> {
    let mut buffer = [0_u8; 8];
    reader.read_exact(&mut buffer)?;
    usize::try_from(u64::from_le_bytes(buffer)).map_err(|_| invalid_data("entry count overflows"))
}

fn invalid_data(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}
