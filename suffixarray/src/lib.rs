pub mod error;
pub mod peptide_search;
pub mod sa_searcher;
#[cfg(test)]
mod test_data;

use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::num::NonZeroUsize;
use std::time::Instant;

use bytelines::ByteLines;
use clap::Parser;
use get_size::GetSize;
use sa_mappings::proteins::Proteins;
use sa_mappings::suffix_to_protein_index::SuffixToProteinMappingStyle;
use sa_mappings::taxonomy::{AggregationMethod, TaxonAggregator};
use suffixarray_builder::binary::{load_binary, write_binary};
use suffixarray_builder::{build_index, BuildOptions, SAConstructionAlgorithm, SuffixArrayIndex};
use tracing::{info, warn};

use crate::peptide_search::{
    search_all_peptides, OutputFormat, Query, SearchMode, SearchOptions, SearchRecord,
};
use crate::sa_searcher::Searcher;

#[derive(Parser, Debug)]
pub struct Arguments {
    /// File with the proteins used to build the index, one protein per line formatted as
    /// `<accession>\t<taxon id>\t<sequence>`
    #[arg(short, long)]
    database_file: String,
    /// File with one peptide per line, optionally followed by a tab and the expected result.
    /// The peptides are read from stdin when no file is given.
    #[arg(short, long)]
    search_file: Option<String>,
    /// `match` will only look if there is match.
    /// `all-occurrences` will report every protein the peptide occurs in, with its positions.
    /// `taxon-id` will search for the lowest common ancestor of the taxa of all matching proteins
    #[arg(short, long, value_enum)]
    mode: Option<SearchMode>,
    #[arg(short, long)]
    /// The taxonomy to be used as a tsv file. This is a preprocessed version of the NCBI taxonomy.
    taxonomy: String,
    /// How the taxa of the matching proteins are reduced to a single taxon in `taxon-id` mode
    #[arg(long, value_enum, default_value_t = AggregationMethod::Lca)]
    aggregation: AggregationMethod,
    /// This will only build the index and stop after that is completed.
    #[arg(long, requires = "output")]
    build_only: bool,
    /// Output file to store the built index.
    #[arg(short, long)]
    output: Option<String>,
    /// Load a previously built index instead of building one
    #[arg(long, conflicts_with = "build_only")]
    load_index: Option<String>,
    /// The sample rate used on the suffix array (default value 1, which means every value in the SA is used)
    #[arg(long, default_value_t = 1)]
    sample_rate: u8,
    /// Set the style used to map back from the suffix to the protein. 2 options <sparse> or <dense>. Sparse is default
    /// Dense uses O(n) memory with n the size of the input text, and takes O(1) time to find the mapping
    /// Sparse uses O(m) memory with m the number of proteins, and takes O(log m) to find the mapping
    #[arg(long, value_enum, default_value_t = SuffixToProteinMappingStyle::Sparse)]
    suffix_to_protein_mapping: SuffixToProteinMappingStyle,
    #[arg(short, long, value_enum, default_value_t = SAConstructionAlgorithm::LibDivSufSort)]
    construction_algorithm: SAConstructionAlgorithm,
    /// Bits used to store a single suffix array entry, defaults to the least amount that fits
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=64))]
    bits_per_value: Option<u8>,
    /// Refuse to build when the construction is expected to use more bytes than this, defaults to
    /// the memory available on the system
    #[arg(long)]
    memory_limit: Option<u64>,
    /// Assume the resulting taxon ID is root (1) whenever a peptide matches >= cutoff proteins
    #[arg(long, default_value_t = 10000)]
    cutoff: usize,
    /// Consider I and L the same residue
    #[arg(long)]
    equate_il: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output_format: OutputFormat,
    #[arg(long)]
    threads: Option<NonZeroUsize>,
}

impl Arguments {
    fn build_options(&self) -> BuildOptions {
        BuildOptions {
            sample_rate: self.sample_rate,
            mapping_style: self.suffix_to_protein_mapping,
            construction_algorithm: self.construction_algorithm.clone(),
            bits_per_value: self.bits_per_value.map(usize::from),
            memory_limit: self.memory_limit,
        }
    }

    fn search_options(&self) -> SearchOptions {
        SearchOptions {
            equate_il: self.equate_il,
            cutoff: self.cutoff,
        }
    }
}

pub fn run(args: Arguments) -> Result<(), Box<dyn Error>> {
    let mode = match (args.mode, args.build_only) {
        (Some(mode), _) => Some(mode),
        (None, true) => None,
        (None, false) => return Err("a search mode is required unless --build-only is given".into()),
    };

    let start_time = Instant::now();
    let taxon_aggregator = TaxonAggregator::try_from_taxonomy_file(&args.taxonomy, args.aggregation)?;

    let proteins = Proteins::try_from_database_file(&args.database_file, &taxon_aggregator)?;
    info!(
        "Read the proteins ({} bytes) in {:?}",
        proteins.get_heap_size(),
        start_time.elapsed()
    );

    let index = load_or_build_index(&args, &proteins)?;

    if let Some(output) = &args.output {
        write_binary(&index, output)?;
    }

    // option that only builds the index, but does not allow for querying
    let Some(mode) = mode.filter(|_| !args.build_only) else {
        return Ok(());
    };

    let searcher = Searcher::new(index, proteins, taxon_aggregator)?;

    // Explicitly set the number of threads to use if the commandline argument was set
    if let Some(threads) = args.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads.get())
            .build_global()?;
    }

    execute_search(&searcher, &args, mode)
}

fn load_or_build_index(
    args: &Arguments,
    proteins: &Proteins,
) -> Result<SuffixArrayIndex, Box<dyn Error>> {
    let start_time = Instant::now();

    let index = match &args.load_index {
        Some(index_file_name) => {
            if args.build_options() != BuildOptions::default() {
                warn!("The build options are ignored, the index is loaded from {index_file_name}");
            }
            load_binary(index_file_name)?
        }
        None => build_index(proteins, &args.build_options())?,
    };

    info!(
        "Index ready in {:?}: {} suffixes with sample rate {} ({} bytes), {:?} mapping ({} bytes), corpus digest {}",
        start_time.elapsed(),
        index.sa.len(),
        index.sa.sample_rate(),
        index.sa.heap_size(),
        index.suffix_index_to_protein.style(),
        index.suffix_index_to_protein.heap_size(),
        index.digest_hex()
    );

    Ok(index)
}

/// Reads the queries from the search file, or from stdin if no search file is given
fn read_queries(search_file: Option<&str>) -> Result<Vec<Query>, io::Error> {
    match search_file {
        Some(search_file) => parse_queries(BufReader::new(File::open(search_file)?)),
        None => parse_queries(io::stdin().lock()),
    }
}

/// Parses one query per line. Bytes that are not valid UTF-8 are replaced, so such a line fails
/// on its own when it is searched.
fn parse_queries(reader: impl BufRead) -> Result<Vec<Query>, io::Error> {
    let mut lines = ByteLines::new(reader);
    let mut queries = Vec::new();
    while let Some(line) = lines.next() {
        queries.push(Query::parse(&String::from_utf8_lossy(line?)));
    }

    Ok(queries)
}

/// Perform the search as set with the commandline arguments
fn execute_search(searcher: &Searcher, args: &Arguments, mode: SearchMode) -> Result<(), Box<dyn Error>> {
    let queries = read_queries(args.search_file.as_deref())?;

    let start_time = Instant::now();
    let records = search_all_peptides(searcher, &queries, mode, &args.search_options())?;
    info!("Searched {} peptides in {:?}", queries.len(), start_time.elapsed());

    let stdout = io::stdout();
    let mut writer = BufWriter::new(stdout.lock());
    for record in &records {
        writeln!(writer, "{}", record.render(args.output_format)?)?;
    }
    writer.flush()?;

    report_expected_results(&queries, &records);
    Ok(())
}

/// Logs how many results match the expected results given in the search file
fn report_expected_results(queries: &[Query], records: &[SearchRecord]) {
    let (total, matching) = queries
        .iter()
        .zip(records)
        .filter_map(|(query, record)| query.expected.as_ref().map(|expected| (expected, record)))
        .fold((0, 0), |(total, matching), (expected, record)| {
            (total + 1, matching + usize::from(*expected == record.result_text()))
        });

    if total > 0 {
        info!("{matching} of {total} results match the expected result");
    }
}
