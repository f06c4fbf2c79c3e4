pub mod binary;
pub mod error;
pub mod sais;

use std::error::Error;
use std::fs;
use std::time::Instant;

use bitarray::BitArray;
use clap::{Parser, ValueEnum};
use data_encoding::HEXLOWER;
use sa_mappings::proteins::Proteins;
use sa_mappings::suffix_to_protein_index::{
    build_suffix_to_protein, SuffixToProteinIndex, SuffixToProteinMappingStyle,
};
use sa_mappings::taxonomy::{AggregationMethod, TaxonAggregator};
use tracing::{debug, info};

use crate::binary::write_binary;
pub use crate::error::{BuildError, IndexLoadError};

/// Enum that represents all possible commandline arguments
#[derive(Parser, Debug)]
pub struct Arguments {
    /// File with the proteins used to build the index, one protein per line formatted as
    /// `<accession>\t<taxon id>\t<sequence>`
    #[arg(short, long)]
    pub database_file: String,
    /// The taxonomy to be used as a tsv file. This is a preprocessed version of the NCBI taxonomy.
    #[arg(short, long)]
    pub taxonomy: String,
    /// Output file to store the built index.
    #[arg(short, long)]
    pub output: String,
    /// Only suffixes starting at a multiple of the sample rate are kept (1 keeps every suffix)
    #[arg(short, long, default_value_t = 1)]
    pub sample_rate: u8,
    /// How a suffix is mapped back to the protein it belongs to
    #[arg(long, value_enum, default_value_t = SuffixToProteinMappingStyle::Sparse)]
    pub suffix_to_protein_mapping: SuffixToProteinMappingStyle,
    #[arg(short, long, value_enum, default_value_t = SAConstructionAlgorithm::LibDivSufSort)]
    pub construction_algorithm: SAConstructionAlgorithm,
    /// Bits used to store a single suffix array entry, defaults to the least amount that fits
    /// every position of the input string
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=64))]
    pub bits_per_value: Option<u8>,
    /// Refuse to build when the construction is expected to use more bytes than this, defaults to
    /// the memory available on the system
    #[arg(long)]
    pub memory_limit: Option<u64>,
}

impl Arguments {
    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            sample_rate: self.sample_rate,
            mapping_style: self.suffix_to_protein_mapping,
            construction_algorithm: self.construction_algorithm.clone(),
            bits_per_value: self.bits_per_value.map(usize::from),
            memory_limit: self.memory_limit,
        }
    }
}

/// Enum representing the two possible algorithms to construct the suffix array
#[derive(ValueEnum, Clone, Debug, PartialEq, Default)]
pub enum SAConstructionAlgorithm {
    #[default]
    LibDivSufSort,
    Sais,
}

/// Everything that influences the index that is built
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOptions {
    pub sample_rate: u8,
    pub mapping_style: SuffixToProteinMappingStyle,
    pub construction_algorithm: SAConstructionAlgorithm,
    /// `None` uses the least amount of bits that fits the largest suffix
    pub bits_per_value: Option<usize>,
    /// Upper bound for the estimated working set of the construction, in bytes. `None` uses the
    /// memory available on the system
    pub memory_limit: Option<u64>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            sample_rate: 1,
            mapping_style: SuffixToProteinMappingStyle::Sparse,
            construction_algorithm: SAConstructionAlgorithm::LibDivSufSort,
            bits_per_value: None,
            memory_limit: None,
        }
    }
}

/// The retained entries of a suffix array, in suffix order. Entry `rank` holds the position in
/// the input string of the `rank`-th retained suffix. Only suffixes starting at a multiple of the
/// sample rate are retained.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledSuffixArray {
    sample_rate: u8,
    entries: BitArray,
}

impl SampledSuffixArray {
    pub fn new(sample_rate: u8, entries: BitArray) -> Self {
        Self { sample_rate, entries }
    }

    /// Returns the suffix stored at `rank`
    pub fn get(&self, rank: usize) -> i64 {
        self.entries.get(rank) as i64
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn sample_rate(&self) -> u8 {
        self.sample_rate
    }

    pub fn bits_per_value(&self) -> usize {
        self.entries.bits_per_value()
    }

    pub fn heap_size(&self) -> usize {
        self.entries.heap_size()
    }

    pub(crate) fn entries(&self) -> &BitArray {
        &self.entries
    }
}

/// A suffix array index together with the information needed to map its suffixes to proteins
pub struct SuffixArrayIndex {
    pub sa: SampledSuffixArray,
    pub suffix_index_to_protein: Box<dyn SuffixToProteinIndex>,
    /// Length of the input string the index was built on
    pub corpus_length: u64,
    /// BLAKE3 hash of the input string the index was built on
    pub corpus_digest: [u8; 32],
}

impl SuffixArrayIndex {
    pub fn digest_hex(&self) -> String {
        HEXLOWER.encode(&self.corpus_digest)
    }
}

/// Hashes an input string, used to tie an index to the proteins it was built for
pub fn corpus_digest(text: &[u8]) -> [u8; 32] {
    *blake3::hash(text).as_bytes()
}

/// Estimates the peak amount of bytes used while building an index
///
/// # Arguments
/// * `text_length` - The length of the input string
/// * `protein_count` - The amount of proteins in the input string
/// * `bits_per_value` - The width of a single stored suffix
/// * `options` - The options the index is built with
pub fn estimate_working_set(
    text_length: usize,
    protein_count: usize,
    bits_per_value: usize,
    options: &BuildOptions,
) -> u64 {
    let n = text_length as u64;

    // translated copy of the input string, plus the full suffix array and the scratch space of
    // the construction algorithm
    let construction = match options.construction_algorithm {
        SAConstructionAlgorithm::LibDivSufSort => n + 8 * n,
        SAConstructionAlgorithm::Sais => n + 4 * n + 15 * n,
    };

    let sampled_entries = text_length.div_ceil(options.sample_rate.max(1) as usize);
    let sampled = 8 * BitArray::words_needed(sampled_entries, bits_per_value) as u64;

    let mapper = match options.mapping_style {
        SuffixToProteinMappingStyle::Dense => 4 * n,
        SuffixToProteinMappingStyle::Sparse => 8 * (protein_count as u64 + 1),
    };

    construction + sampled + mapper
}

/// Extracts `MemAvailable` from the contents of `/proc/meminfo`, in bytes
fn parse_mem_available(meminfo: &str) -> Option<u64> {
    meminfo.lines().find_map(|line| {
        let kib = line.strip_prefix("MemAvailable:")?.trim().strip_suffix("kB")?;
        kib.trim().parse::<u64>().ok()?.checked_mul(1024)
    })
}

/// The memory the system can still hand out, `None` when it can not be determined
fn available_memory() -> Option<u64> {
    let meminfo = fs::read_to_string("/proc/meminfo").ok()?;
    parse_mem_available(&meminfo)
}

/// The explicit memory limit if one is given, otherwise the memory that is available
fn memory_budget(memory_limit: Option<u64>, available: impl FnOnce() -> Option<u64>) -> Option<u64> {
    memory_limit.or_else(available)
}

/// Builds the sampled suffix array and the suffix to protein mapping for the given proteins
///
/// # Arguments
/// * `proteins` - The proteins, concatenated in their input string
/// * `options` - The options that determine the index
///
/// # Returns
///
/// Returns the built index
///
/// # Errors
///
/// Returns a `BuildError` if the options are invalid, the input string can not be indexed with
/// the chosen options, or the construction needs more memory than allowed
pub fn build_index(
    proteins: &Proteins,
    options: &BuildOptions,
) -> Result<SuffixArrayIndex, BuildError> {
    if options.sample_rate == 0 {
        return Err(BuildError::InvalidSampleRate);
    }

    let text = &proteins.input_string;
    if proteins.len() >= u32::MAX as usize {
        return Err(BuildError::CorpusTooLarge(format!(
            "{} proteins do not fit in a 32 bit protein index",
            proteins.len()
        )));
    }
    if options.construction_algorithm == SAConstructionAlgorithm::Sais
        && text.len() > sais::MAX_TEXT_LENGTH
    {
        return Err(BuildError::CorpusTooLarge(format!(
            "sais supports at most {} symbols, the input string has {}",
            sais::MAX_TEXT_LENGTH,
            text.len()
        )));
    }

    let bits_needed = BitArray::bits_needed(text.len().saturating_sub(1) as u64);
    let bits_per_value = match options.bits_per_value {
        None => bits_needed,
        Some(bits) if !(1..=64).contains(&bits) => return Err(BuildError::InvalidBitsPerValue(bits)),
        Some(bits) if bits < bits_needed => {
            return Err(BuildError::CorpusTooLarge(format!(
                "{bits} bits per value can not store suffixes of an input string of length {}",
                text.len()
            )))
        }
        Some(bits) => bits,
    };

    let required = estimate_working_set(text.len(), proteins.len(), bits_per_value, options);
    let budget = memory_budget(options.memory_limit, available_memory);
    match budget {
        Some(limit) => info!(
            "Building the index is expected to use about {} MiB of the {} MiB budget",
            required >> 20,
            limit >> 20
        ),
        None => info!("Building the index is expected to use about {} MiB", required >> 20),
    }
    if let Some(limit) = budget {
        if required > limit {
            return Err(BuildError::OutOfMemory { required, limit: Some(limit) });
        }
    }

    let start_time = Instant::now();

    // translate all L's to an I, a search decides afterwards whether I and L are equal
    let mut translated = Vec::new();
    translated.try_reserve_exact(text.len()).map_err(|_| BuildError::OutOfMemory {
        required: text.len() as u64,
        limit: budget,
    })?;
    translated.extend(text.iter().map(|&character| if character == b'L' { b'I' } else { character }));

    let sa = match options.construction_algorithm {
        _ if translated.is_empty() => BitArray::with_capacity(0, bits_per_value),
        SAConstructionAlgorithm::LibDivSufSort => {
            let mut sa = libdivsufsort_rs::divsufsort64(&translated).ok_or_else(|| {
                BuildError::ConstructionFailed("libdivsufsort could not sort the input string".to_string())
            })?;
            drop(translated);
            info!("Constructed the suffix array with libdivsufsort in {:?}", start_time.elapsed());

            sample_in_place(&mut sa, options.sample_rate);
            pack(&sa, bits_per_value)
        }
        SAConstructionAlgorithm::Sais => {
            let mut sa = sais::suffix_array(&translated);
            drop(translated);
            info!("Constructed the suffix array with sais in {:?}", start_time.elapsed());

            sample_in_place(&mut sa, options.sample_rate);
            pack(&sa, bits_per_value)
        }
    };
    debug!(
        "Kept {} suffixes with sample rate {}, stored with {} bits each",
        sa.len(),
        options.sample_rate,
        bits_per_value
    );

    let suffix_index_to_protein = build_suffix_to_protein(options.mapping_style, text);
    info!(
        "Built the {:?} suffix to protein mapping ({} bytes)",
        options.mapping_style,
        suffix_index_to_protein.heap_size()
    );

    Ok(SuffixArrayIndex {
        sa: SampledSuffixArray::new(options.sample_rate, sa),
        suffix_index_to_protein,
        corpus_length: text.len() as u64,
        corpus_digest: corpus_digest(text),
    })
}

/// Keeps the suffixes that start at a multiple of `sample_rate`, preserving their order
fn sample_in_place<T: Copy + Into<i64>>(sa: &mut Vec<T>, sample_rate: u8) {
    if sample_rate > 1 {
        let sample_rate = sample_rate as i64;
        sa.retain(|&suffix| suffix.into() % sample_rate == 0);
        sa.shrink_to_fit();
    }
}

fn pack<T: Copy + Into<i64>>(sa: &[T], bits_per_value: usize) -> BitArray {
    let mut packed = BitArray::with_capacity(sa.len(), bits_per_value);
    for (rank, &suffix) in sa.iter().enumerate() {
        packed.set(rank, suffix.into() as u64);
    }
    packed
}

/// Reads the proteins, builds the index and writes it to the output file
///
/// # Errors
///
/// Returns any error that occurred while reading the input, building or writing the index
pub fn run(args: Arguments) -> Result<(), Box<dyn Error>> {
    let taxon_aggregator =
        TaxonAggregator::try_from_taxonomy_file(&args.taxonomy, AggregationMethod::Lca)?;

    let start_time = Instant::now();
    let proteins = Proteins::try_from_database_file(&args.database_file, &taxon_aggregator)?;
    info!("Loaded the proteins in {:?}", start_time.elapsed());

    let index = build_index(&proteins, &args.build_options())?;
    write_binary(&index, &args.output)?;
    info!("Wrote the index to {} in {:?}", args.output, start_time.elapsed());

    Ok(())
}
