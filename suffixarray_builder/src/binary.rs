use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};

use bitarray::binary::Binary;
use bitarray::BitArray;
use sa_mappings::suffix_to_protein_index::{read_suffix_to_protein, SuffixToProteinMappingStyle};
use tracing::{debug, info};

use crate::{IndexLoadError, SampledSuffixArray, SuffixArrayIndex};

/// Identifies an index file
pub const MAGIC: [u8; 8] = *b"PEPSSAIX";

/// The version of the file layout
pub const FORMAT_VERSION: u8 = 1;

/// magic, version, sample rate, bits per value, mapping tag, corpus length and digest
const HEADER_LENGTH: u64 = 8 + 4 + 8 + 32;

/// Writes the index to `path`. The index is first written to `<path>.tmp`, which is only renamed
/// to `path` once it is completely written and synced to disk.
///
/// # Errors
///
/// Returns an io error if the index could not be written, in that case no file is left behind
pub fn write_binary(index: &SuffixArrayIndex, path: &str) -> Result<(), io::Error> {
    let tmp_path = format!("{path}.tmp");

    let result = write_to_file(index, &tmp_path).and_then(|_| fs::rename(&tmp_path, path));
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

fn write_to_file(index: &SuffixArrayIndex, path: &str) -> Result<(), io::Error> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true) // if the file already exists, empty the file
        .open(path)?;
    let mut writer = BufWriter::new(file);

    write_index(index, &mut writer)?;

    let file = writer.into_inner().map_err(|err| err.into_error())?;
    file.sync_all()?;

    info!("Wrote the index to {path}");
    Ok(())
}

/// Serializes the index in little endian order
pub fn write_index(index: &SuffixArrayIndex, writer: &mut impl Write) -> Result<(), io::Error> {
    writer.write_all(&MAGIC)?;
    writer.write_all(&[
        FORMAT_VERSION,
        index.sa.sample_rate(),
        index.sa.bits_per_value() as u8,
        index.suffix_index_to_protein.style().tag(),
    ])?;
    writer.write_all(&index.corpus_length.to_le_bytes())?;
    writer.write_all(&index.corpus_digest)?;

    writer.write_all(&(index.sa.len() as u64).to_le_bytes())?;
    index.sa.entries().write_binary(&mut *writer)?;

    index.suffix_index_to_protein.write_binary(writer)?;
    writer.flush()
}

/// Loads an index written by `write_binary`
///
/// # Errors
///
/// Returns `IndexLoadError::CorruptArtifact` if the file is not a complete and consistent index
/// and `IndexLoadError::Io` if it could not be read
pub fn load_binary(path: &str) -> Result<SuffixArrayIndex, IndexLoadError> {
    let file = File::open(path)?;
    let file_length = file.metadata()?.len();
    let index = read_index(BufReader::new(file), file_length)?;

    info!(
        "Loaded an index with {} suffixes (sample rate {}, {} bits per value) from {path}",
        index.sa.len(),
        index.sa.sample_rate(),
        index.sa.bits_per_value()
    );
    Ok(index)
}

fn corrupt(message: impl Into<String>) -> IndexLoadError {
    IndexLoadError::CorruptArtifact(message.into())
}

/// Converts read failures into corruption errors, a short read means the file is truncated
fn map_read_error(err: io::Error) -> IndexLoadError {
    match err.kind() {
        io::ErrorKind::UnexpectedEof => corrupt("the file is truncated"),
        io::ErrorKind::InvalidData => corrupt(err.to_string()),
        _ => IndexLoadError::Io(err),
    }
}

fn read_array<const N: usize>(reader: &mut impl Read) -> Result<[u8; N], IndexLoadError> {
    let mut buffer = [0_u8; N];
    reader.read_exact(&mut buffer).map_err(map_read_error)?;
    Ok(buffer)
}

fn read_u64(reader: &mut impl Read) -> Result<u64, IndexLoadError> {
    Ok(u64::from_le_bytes(read_array(reader)?))
}

/// Deserializes an index, `length` is the amount of bytes the reader holds
pub fn read_index(mut reader: impl BufRead, length: u64) -> Result<SuffixArrayIndex, IndexLoadError> {
    if read_array::<8>(&mut reader)? != MAGIC {
        return Err(corrupt("not an index file"));
    }

    let [version, sample_rate, bits_per_value, mapping_tag] = read_array::<4>(&mut reader)?;
    if version != FORMAT_VERSION {
        return Err(corrupt(format!("unsupported format version {version}")));
    }
    if sample_rate == 0 {
        return Err(corrupt("the sample rate is 0"));
    }
    if !(1..=64).contains(&bits_per_value) {
        return Err(corrupt(format!("invalid amount of bits per value: {bits_per_value}")));
    }
    let mapping_style = SuffixToProteinMappingStyle::from_tag(mapping_tag)
        .ok_or_else(|| corrupt(format!("unknown suffix to protein mapping {mapping_tag}")))?;

    let corpus_length = read_u64(&mut reader)?;
    let corpus_digest = read_array::<32>(&mut reader)?;
    debug!("Index header: corpus length {corpus_length}, sample rate {sample_rate}, {bits_per_value} bits per value, {mapping_style:?} mapping");

    let entries = read_u64(&mut reader)?;
    if entries != corpus_length.div_ceil(sample_rate as u64) {
        return Err(corrupt(format!(
            "{entries} suffixes do not match a corpus of length {corpus_length} with sample rate {sample_rate}"
        )));
    }

    let words = entries
        .checked_mul(bits_per_value as u64)
        .map(|bits| bits.div_ceil(64))
        .ok_or_else(|| corrupt("the suffix array is too large"))?;
    if HEADER_LENGTH + 8 + 8 * words + 8 > length {
        return Err(corrupt("the file is truncated"));
    }

    let entries = entries as usize;
    let mut sa = BitArray::with_capacity(entries, bits_per_value as usize);
    sa.read_binary(&mut reader).map_err(map_read_error)?;

    for rank in 0..entries {
        let suffix = sa.get(rank);
        if suffix >= corpus_length || suffix % sample_rate as u64 != 0 {
            return Err(corrupt(format!("suffix {suffix} at rank {rank} is not a sampled position")));
        }
    }

    let suffix_index_to_protein =
        read_suffix_to_protein(mapping_style, &mut reader, corpus_length as usize)
            .map_err(map_read_error)?;

    if !reader.fill_buf()?.is_empty() {
        return Err(corrupt("unexpected data after the end of the index"));
    }

    Ok(SuffixArrayIndex {
        sa: SampledSuffixArray::new(sample_rate, sa),
        suffix_index_to_protein,
        corpus_length,
        corpus_digest,
    })
}
