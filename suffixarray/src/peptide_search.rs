use std::collections::BTreeMap;

use clap::ValueEnum;
use rayon::prelude::*;
use sa_mappings::proteins::Protein;
use sa_mappings::taxonomy::ROOT_TAXON;
use serde::Serialize;
use tracing::warn;
use umgap::taxon::TaxonId;

use crate::error::SearchError;
use crate::sa_searcher::{SearchAllSuffixesResult, Searcher};

/// The residues a peptide may consist of: the 20 standard amino acids, selenocysteine (U),
/// pyrrolysine (O) and unknown residues (X). An X only matches an X.
const AMINO_ACIDS: &[u8] = b"ACDEFGHIKLMNPQRSTVWYUOX";

/// Enum that represents the kinds of search that we support
/// - Search until match and return boolean that indicates if there is a match
/// - Search all matches and report every protein they occur in
/// - Search all matches and aggregate the taxa of the matched proteins into their lowest common ancestor
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchMode {
    Match,
    AllOccurrences,
    TaxonId,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// `<peptide>;<result>`
    #[default]
    Text,
    /// one json object per peptide
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    /// Treat I and L as the same residue
    pub equate_il: bool,
    /// In taxon id mode, the result is the root once this many matches are found
    pub cutoff: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            equate_il: false,
            cutoff: 10_000,
        }
    }
}

/// A protein that contains a peptide, with the positions of the peptide in the protein
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProteinOccurrences {
    pub uniprot_id: String,
    pub taxon_id: TaxonId,
    pub offsets: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchOutcome {
    Match(bool),
    /// Proteins in the order of the database
    AllOccurrences(Vec<ProteinOccurrences>),
    TaxonId {
        taxon: Option<TaxonId>,
        cutoff_used: bool,
    },
}

impl SearchOutcome {
    fn to_text(&self) -> String {
        match self {
            Self::Match(found) => found.to_string(),
            Self::AllOccurrences(proteins) => {
                let mut text = proteins.len().to_string();
                for protein in proteins {
                    let offsets: Vec<String> =
                        protein.offsets.iter().map(|offset| offset.to_string()).collect();
                    text.push_str(&format!(";{}:{}", protein.uniprot_id, offsets.join(",")));
                }
                text
            }
            Self::TaxonId { taxon: Some(taxon), .. } => taxon.to_string(),
            Self::TaxonId { taxon: None, .. } => "/".to_string(),
        }
    }
}

/// A line of the search input: the peptide, optionally followed by a tab and the expected result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub peptide: String,
    pub expected: Option<String>,
}

impl Query {
    pub fn parse(line: &str) -> Self {
        let line = line.trim_end_matches(['\n', '\r']);
        match line.split_once('\t') {
            Some((peptide, expected)) => Self {
                peptide: peptide.to_string(),
                expected: Some(expected.trim().to_string()),
            },
            None => Self {
                peptide: line.to_string(),
                expected: None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchRecord {
    pub peptide: String,
    #[serde(flatten)]
    pub outcome: RecordOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOutcome {
    Result(SearchOutcome),
    Error(String),
}

impl SearchRecord {
    /// The result as printed after the peptide in text output
    pub fn result_text(&self) -> String {
        match &self.outcome {
            RecordOutcome::Result(outcome) => outcome.to_text(),
            RecordOutcome::Error(message) => format!("error;{message}"),
        }
    }

    /// Renders the record as one output line, without line ending
    ///
    /// # Errors
    ///
    /// Returns a `serde_json::Error` if the record could not be serialized
    pub fn render(&self, format: OutputFormat) -> Result<String, serde_json::Error> {
        match format {
            OutputFormat::Text => Ok(format!("{};{}", self.peptide, self.result_text())),
            OutputFormat::Json => serde_json::to_string(self),
        }
    }
}

/// Trims and upper-cases a peptide
///
/// # Errors
///
/// Returns `SearchError::EmptyQuery` for an empty peptide and `SearchError::InvalidSymbol` for the
/// first symbol that is not an accepted amino acid
pub fn normalize_peptide(peptide: &str) -> Result<String, SearchError> {
    let peptide = peptide.trim();
    if peptide.is_empty() {
        return Err(SearchError::EmptyQuery);
    }

    for (position, symbol) in peptide.chars().enumerate() {
        let accepted = symbol.is_ascii() && AMINO_ACIDS.contains(&(symbol.to_ascii_uppercase() as u8));
        if !accepted {
            return Err(SearchError::InvalidSymbol { symbol, position });
        }
    }

    Ok(peptide.to_ascii_uppercase())
}

/// Executes the search of 1 peptide
///
/// # Arguments
/// * `searcher` - The searcher that holds the index
/// * `peptide` - The peptide as it was given, it is normalized first
/// * `mode` - What to report about the matches
/// * `options` - Options that influence the matching
///
/// # Errors
///
/// Returns `EmptyQuery` or `InvalidSymbol` for peptides that can not be searched, and
/// `InvalidOffset` if a match could not be mapped to a protein
pub fn search_peptide(
    searcher: &Searcher,
    peptide: &str,
    mode: SearchMode,
    options: &SearchOptions,
) -> Result<SearchOutcome, SearchError> {
    let peptide = normalize_peptide(peptide)?;
    let peptide = peptide.as_bytes();

    match mode {
        SearchMode::Match => {
            let result = searcher.search_matching_suffixes(peptide, 1, options.equate_il);
            Ok(SearchOutcome::Match(result != SearchAllSuffixesResult::NoMatches))
        }
        SearchMode::AllOccurrences => {
            let suffixes = match searcher.search_matching_suffixes(peptide, usize::MAX, options.equate_il) {
                SearchAllSuffixesResult::NoMatches => vec![],
                SearchAllSuffixesResult::SearchResult(suffixes)
                | SearchAllSuffixesResult::MaxMatches(suffixes) => suffixes,
            };
            let proteins = searcher.retrieve_proteins(&suffixes)?;
            Ok(SearchOutcome::AllOccurrences(group_by_protein(&proteins, &suffixes)))
        }
        SearchMode::TaxonId => {
            match searcher.search_matching_suffixes(peptide, options.cutoff, options.equate_il) {
                SearchAllSuffixesResult::NoMatches => Ok(SearchOutcome::TaxonId {
                    taxon: None,
                    cutoff_used: false,
                }),
                SearchAllSuffixesResult::MaxMatches(_) => Ok(SearchOutcome::TaxonId {
                    taxon: Some(ROOT_TAXON),
                    cutoff_used: true,
                }),
                SearchAllSuffixesResult::SearchResult(suffixes) => {
                    let proteins = searcher.retrieve_proteins(&suffixes)?;
                    Ok(SearchOutcome::TaxonId {
                        taxon: searcher.retrieve_lca(&proteins),
                        cutoff_used: false,
                    })
                }
            }
        }
    }
}

/// Groups the matches per protein, `proteins[i]` is the protein that contains `suffixes[i]`
fn group_by_protein(proteins: &[&Protein], suffixes: &[i64]) -> Vec<ProteinOccurrences> {
    // keyed on the start of the protein, which orders the proteins like the database
    let mut grouped: BTreeMap<usize, (&Protein, Vec<usize>)> = BTreeMap::new();
    for (&protein, &suffix) in proteins.iter().zip(suffixes) {
        let (start, _) = protein.sequence;
        grouped
            .entry(start)
            .or_insert_with(|| (protein, vec![]))
            .1
            .push(suffix as usize - start);
    }

    grouped
        .into_values()
        .map(|(protein, mut offsets)| {
            offsets.sort_unstable();
            offsets.dedup();
            ProteinOccurrences {
                uniprot_id: protein.uniprot_id.clone(),
                taxon_id: protein.taxon_id,
                offsets,
            }
        })
        .collect()
}

/// Searches all peptides in parallel, the records are returned in the order of the queries.
/// A peptide that can not be searched results in an error record, the other peptides are still
/// searched.
///
/// # Errors
///
/// Returns the first error that is not recoverable
pub fn search_all_peptides(
    searcher: &Searcher,
    queries: &[Query],
    mode: SearchMode,
    options: &SearchOptions,
) -> Result<Vec<SearchRecord>, SearchError> {
    queries
        .par_iter()
        .map(|query| {
            let outcome = match search_peptide(searcher, &query.peptide, mode, options) {
                Ok(outcome) => RecordOutcome::Result(outcome),
                Err(err) if err.is_recoverable() => {
                    warn!("Could not search {:?}: {err}", query.peptide);
                    RecordOutcome::Error(err.to_string())
                }
                Err(err) => return Err(err),
            };

            Ok(SearchRecord {
                peptide: query.peptide.clone(),
                outcome,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use sa_mappings::suffix_to_protein_index::SuffixToProteinMappingStyle;
    use serde_json::json;
    use tempdir::TempDir;

    use super::*;
    use crate::test_data::create_searcher;

    fn queries(lines: &[&str]) -> Vec<Query> {
        lines.iter().map(|line| Query::parse(line)).collect()
    }

    #[test]
    fn test_normalize_peptide() {
        assert_eq!(normalize_peptide(" mktayi\n"), Ok("MKTAYI".to_string()));
        assert_eq!(normalize_peptide("UOXW"), Ok("UOXW".to_string()));
        assert_eq!(normalize_peptide(""), Err(SearchError::EmptyQuery));
        assert_eq!(normalize_peptide(" \r\n"), Err(SearchError::EmptyQuery));
        assert_eq!(
            normalize_peptide("MZTAY"),
            Err(SearchError::InvalidSymbol { symbol: 'Z', position: 1 })
        );
        for (peptide, symbol) in [("B", 'B'), ("j", 'j'), ("MK1", '1'), ("MK-", '-'), ("Mé", 'é')] {
            assert!(matches!(
                normalize_peptide(peptide),
                Err(SearchError::InvalidSymbol { symbol: found, .. }) if found == symbol
            ));
        }
    }

    #[test]
    fn test_query_parse() {
        assert_eq!(
            Query::parse("MKTAYI\t207598\n"),
            Query { peptide: "MKTAYI".to_string(), expected: Some("207598".to_string()) }
        );
        assert_eq!(
            Query::parse("MKTAYI\r\n"),
            Query { peptide: "MKTAYI".to_string(), expected: None }
        );
    }

    #[test]
    fn test_all_occurrences() {
        let tmp_dir = TempDir::new("test_all_occurrences").unwrap();
        let searcher = create_searcher(&tmp_dir, 1, SuffixToProteinMappingStyle::Sparse);

        let outcome =
            search_peptide(&searcher, "MKTAYI", SearchMode::AllOccurrences, &SearchOptions::default())
                .unwrap();
        assert_eq!(
            outcome,
            SearchOutcome::AllOccurrences(vec![
                ProteinOccurrences { uniprot_id: "P1".to_string(), taxon_id: 9606, offsets: vec![0] },
                ProteinOccurrences { uniprot_id: "P2".to_string(), taxon_id: 9598, offsets: vec![0] },
            ])
        );
    }

    #[test]
    fn test_all_occurrences_multiple_in_protein() {
        let tmp_dir = TempDir::new("test_all_occurrences_multiple_in_protein").unwrap();
        let searcher = create_searcher(&tmp_dir, 3, SuffixToProteinMappingStyle::Dense);

        let outcome =
            search_peptide(&searcher, "AK", SearchMode::AllOccurrences, &SearchOptions::default())
                .unwrap();
        assert_eq!(outcome.to_text(), "3;P1:6;P3:8;P4:0");

        let outcome =
            search_peptide(&searcher, "WWW", SearchMode::AllOccurrences, &SearchOptions::default())
                .unwrap();
        assert_eq!(outcome.to_text(), "0");
    }

    #[test]
    fn test_taxon_id() {
        let tmp_dir = TempDir::new("test_taxon_id").unwrap();
        let searcher = create_searcher(&tmp_dir, 2, SuffixToProteinMappingStyle::Sparse);
        let options = SearchOptions::default();

        let outcome = search_peptide(&searcher, "MKTAYI", SearchMode::TaxonId, &options).unwrap();
        assert_eq!(outcome, SearchOutcome::TaxonId { taxon: Some(207598), cutoff_used: false });

        // human and bacterial proteins only share the root
        let outcome = search_peptide(&searcher, "AK", SearchMode::TaxonId, &options).unwrap();
        assert_eq!(outcome, SearchOutcome::TaxonId { taxon: Some(1), cutoff_used: false });

        let outcome = search_peptide(&searcher, "WWW", SearchMode::TaxonId, &options).unwrap();
        assert_eq!(outcome, SearchOutcome::TaxonId { taxon: None, cutoff_used: false });
        assert_eq!(outcome.to_text(), "/");
    }

    #[test]
    fn test_taxon_id_is_monotonic() {
        let tmp_dir = TempDir::new("test_taxon_id_is_monotonic").unwrap();
        let searcher = create_searcher(&tmp_dir, 1, SuffixToProteinMappingStyle::Sparse);
        let options = SearchOptions::default();

        // each shorter peptide matches a superset of the proteins of the longer one
        let expected = [("MKTAYIA", 9606), ("MKTAYI", 207598), ("K", 1)];
        for (peptide, taxon) in expected {
            let outcome = search_peptide(&searcher, peptide, SearchMode::TaxonId, &options).unwrap();
            assert_eq!(outcome, SearchOutcome::TaxonId { taxon: Some(taxon), cutoff_used: false });
        }
    }

    #[test]
    fn test_taxon_id_cutoff() {
        let tmp_dir = TempDir::new("test_taxon_id_cutoff").unwrap();
        let searcher = create_searcher(&tmp_dir, 1, SuffixToProteinMappingStyle::Sparse);
        let options = SearchOptions { cutoff: 2, ..SearchOptions::default() };

        let outcome = search_peptide(&searcher, "MKTAYI", SearchMode::TaxonId, &options).unwrap();
        assert_eq!(outcome, SearchOutcome::TaxonId { taxon: Some(1), cutoff_used: true });

        let outcome = search_peptide(&searcher, "MKTAYIA", SearchMode::TaxonId, &options).unwrap();
        assert_eq!(outcome, SearchOutcome::TaxonId { taxon: Some(9606), cutoff_used: false });
    }

    #[test]
    fn test_match() {
        let tmp_dir = TempDir::new("test_match").unwrap();
        let searcher = create_searcher(&tmp_dir, 4, SuffixToProteinMappingStyle::Sparse);
        let options = SearchOptions::default();

        let matches = |peptide: &str, options: &SearchOptions| {
            search_peptide(&searcher, peptide, SearchMode::Match, options).unwrap()
        };
        assert_eq!(matches("peptide", &options), SearchOutcome::Match(true));
        assert_eq!(matches("LMX", &options), SearchOutcome::Match(true));
        assert_eq!(matches("IMX", &options), SearchOutcome::Match(false));
        assert_eq!(
            matches("IMX", &SearchOptions { equate_il: true, ..options }),
            SearchOutcome::Match(true)
        );
    }

    #[test]
    fn test_search_all_peptides_continues_after_invalid_query() {
        let tmp_dir = TempDir::new("test_search_all_peptides").unwrap();
        let searcher = create_searcher(&tmp_dir, 2, SuffixToProteinMappingStyle::Sparse);

        let records = search_all_peptides(
            &searcher,
            &queries(&["MKTAYI", "MZTAY", "", "MKTAYIA"]),
            SearchMode::TaxonId,
            &SearchOptions::default(),
        )
        .unwrap();

        let lines: Vec<String> =
            records.iter().map(|record| record.render(OutputFormat::Text).unwrap()).collect();
        assert_eq!(
            lines,
            vec![
                "MKTAYI;207598",
                "MZTAY;error;invalid symbol 'Z' at position 1",
                ";error;empty query",
                "MKTAYIA;9606",
            ]
        );
    }

    #[test]
    fn test_search_is_idempotent() {
        let tmp_dir = TempDir::new("test_search_is_idempotent").unwrap();
        let searcher = create_searcher(&tmp_dir, 3, SuffixToProteinMappingStyle::Dense);
        let batch = queries(&["AK", "MKTAYI", "LAKL", "X"]);

        let first = search_all_peptides(&searcher, &batch, SearchMode::AllOccurrences, &SearchOptions::default()).unwrap();
        let second = search_all_peptides(&searcher, &batch, SearchMode::AllOccurrences, &SearchOptions::default()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_render_json() {
        let record = SearchRecord {
            peptide: "MKTAYI".to_string(),
            outcome: RecordOutcome::Result(SearchOutcome::TaxonId {
                taxon: Some(207598),
                cutoff_used: false,
            }),
        };
        let rendered: serde_json::Value =
            serde_json::from_str(&record.render(OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(
            rendered,
            json!({"peptide": "MKTAYI", "result": {"taxon_id": {"taxon": 207598, "cutoff_used": false}}})
        );

        let record = SearchRecord {
            peptide: "".to_string(),
            outcome: RecordOutcome::Error("empty query".to_string()),
        };
        let rendered: serde_json::Value =
            serde_json::from_str(&record.render(OutputFormat::Json).unwrap()).unwrap();
        assert_eq!(rendered, json!({"peptide": "", "error": "empty query"}));
    }
}
