use std::cmp::min;

use sa_mappings::proteins::{Protein, Proteins};
use sa_mappings::suffix_to_protein_index::MappingError;
use sa_mappings::taxonomy::TaxonAggregator;
use suffixarray_builder::{corpus_digest, IndexLoadError, SuffixArrayIndex};
use tracing::debug;
use umgap::taxon::TaxonId;

use crate::sa_searcher::BoundSearch::{Maximum, Minimum};

/// Enum indicating if we are searching for the minimum, or maximum bound in the suffix array
#[derive(Clone, Copy, PartialEq)]
enum BoundSearch {
    Minimum,
    Maximum,
}

/// Enum representing the minimum and maximum bound of the found matches in the suffix array
#[derive(PartialEq, Debug)]
pub enum BoundSearchResult {
    NoMatches,
    SearchResult((usize, usize)),
}

/// Enum representing the matching suffixes after searching a peptide in the suffix array
/// Both the MaxMatches and SearchResult indicate found suffixes, but MaxMatches is used when the cutoff is reached.
#[derive(Debug)]
pub enum SearchAllSuffixesResult {
    NoMatches,
    MaxMatches(Vec<i64>),
    SearchResult(Vec<i64>),
}

/// Custom implementation of partialEq for SearchAllSuffixesResult
/// We consider 2 SearchAllSuffixesResult equal if they exist of the same key, and the Vec contains the same values, but the order can be different
impl PartialEq for SearchAllSuffixesResult {
    fn eq(&self, other: &Self) -> bool {
        fn array_eq_unordered(arr1: &[i64], arr2: &[i64]) -> bool {
            let mut arr1_copy = arr1.to_owned();
            let mut arr2_copy = arr2.to_owned();

            arr1_copy.sort();
            arr2_copy.sort();

            arr1_copy == arr2_copy
        }

        match (self, other) {
            (Self::MaxMatches(arr1), Self::MaxMatches(arr2)) => array_eq_unordered(arr1, arr2),
            (Self::SearchResult(arr1), Self::SearchResult(arr2)) => array_eq_unordered(arr1, arr2),
            (Self::NoMatches, Self::NoMatches) => true,
            _ => false,
        }
    }
}

/// Returns true if the characters are equal when I and L are considered the same
#[inline]
fn equal_il(a: u8, b: u8) -> bool {
    a == b || (a == b'I' && b == b'L') || (a == b'L' && b == b'I')
}

/// Struct that contains all the elements needed to search a peptide in the suffix array
/// This struct also contains all the functions used for search
///
/// # Arguments
/// * `index` - The sampled suffix array and the mapping from suffixes to proteins
/// * `proteins` - List of all the proteins where the suffix array is built on
/// * `taxon_aggregator` - Object representing the used taxonomy, used to compute the lowest common ancestor of matches
pub struct Searcher {
    index: SuffixArrayIndex,
    proteins: Proteins,
    taxon_aggregator: TaxonAggregator,
}

impl Searcher {
    /// Creates a new Searcher object
    ///
    /// # Arguments
    /// * `index` - The sampled suffix array and the mapping from suffixes to proteins
    /// * `proteins` - List of all the proteins where the suffix array is built on
    /// * `taxon_aggregator` - Object representing the used taxonomy
    ///
    /// # Returns
    ///
    /// Returns a new Searcher object
    ///
    /// # Errors
    ///
    /// Returns `IndexLoadError::MismatchedDatabase` if the index was not built on these proteins
    pub fn new(
        index: SuffixArrayIndex,
        proteins: Proteins,
        taxon_aggregator: TaxonAggregator,
    ) -> Result<Self, IndexLoadError> {
        if index.corpus_length != proteins.input_string.len() as u64 {
            return Err(IndexLoadError::MismatchedDatabase(format!(
                "the index covers {} positions, the proteins {}",
                index.corpus_length,
                proteins.input_string.len()
            )));
        }
        if index.corpus_digest != corpus_digest(&proteins.input_string) {
            return Err(IndexLoadError::MismatchedDatabase(format!(
                "the proteins do not hash to {}",
                index.digest_hex()
            )));
        }

        Ok(Self {
            index,
            proteins,
            taxon_aggregator,
        })
    }

    pub fn sample_rate(&self) -> u8 {
        self.index.sa.sample_rate()
    }

    pub fn proteins(&self) -> &Proteins {
        &self.proteins
    }

    /// Compares the `search_string` to the `suffix`
    /// During search this function performs extra logic since the suffix array is build with I == L, while ` self.proteins.input_string` is the original text where I != L
    ///
    /// # Arguments
    /// * `search_string` - The string/peptide being searched in the suffix array
    /// * `suffix` - The current suffix from the suffix array we are comparing with in the binary search
    /// * `skip` - How many characters we can skip in the comparison because we already know these match
    /// * `bound` - Indicates if we are searching for the min of max bound
    ///
    /// # Returns
    ///
    /// The first argument is true if `bound` == `Minimum` and `search_string` <= `suffix` or if `bound` == `Maximum` and `search_string` >= `suffix`
    /// The second argument indicates how far the `suffix` and `search_string` matched
    fn compare(
        &self,
        search_string: &[u8],
        suffix: i64,
        skip: usize,
        bound: BoundSearch,
    ) -> (bool, usize) {
        let text = &self.proteins.input_string;
        let mut index_in_suffix = (suffix as usize) + skip;
        let mut index_in_search_string = skip;
        let mut is_cond_or_equal = false;

        // Depending on if we are searching for the min of max bound our condition is different
        let condition_check = match bound {
            Minimum => |a: u8, b: u8| a < b,
            Maximum => |a: u8, b: u8| a > b,
        };

        // match as long as possible
        while index_in_search_string < search_string.len()
            && index_in_suffix < text.len()
            && equal_il(search_string[index_in_search_string], text[index_in_suffix])
        {
            index_in_suffix += 1;
            index_in_search_string += 1;
        }

        // check if match found OR current search string is smaller lexicographically (and the empty search string should not be found)
        if !search_string.is_empty() {
            if index_in_search_string == search_string.len() {
                is_cond_or_equal = true
            } else if index_in_suffix < text.len() {
                // in our index every L was replaced by a I, so we need to replace them if we want to search in the right direction
                let translate = |character: u8| if character == b'L' { b'I' } else { character };
                is_cond_or_equal = condition_check(
                    translate(search_string[index_in_search_string]),
                    translate(text[index_in_suffix]),
                );
            }
        }

        (is_cond_or_equal, index_in_search_string)
    }

    /// Searches for the minimum or maximum bound for a string in the suffix array
    ///
    /// # Arguments
    /// * `bound` - Indicates if we are searching the minimum or maximum bound
    /// * `search_string` - The string/peptide we are searching in the suffix array
    ///
    /// # Returns
    ///
    /// The first argument is true if a match was found
    /// The second argument indicates the index of the minimum or maximum bound for the match (depending on `bound`)
    fn binary_search_bound(&self, bound: BoundSearch, search_string: &[u8]) -> (bool, usize) {
        let sa = &self.index.sa;
        let mut left: usize = 0;
        let mut right: usize = sa.len();
        let mut lcp_left: usize = 0;
        let mut lcp_right: usize = 0;
        let mut found = false;

        // repeat until search window is minimum size OR we matched the whole search string last iteration
        while right - left > 1 {
            let center = (left + right) / 2;
            let skip = min(lcp_left, lcp_right);
            let (retval, lcp_center) = self.compare(search_string, sa.get(center), skip, bound);

            found |= lcp_center == search_string.len();

            // update the left and right bound, depending on if we are searching the min or max bound
            if retval && bound == Minimum || !retval && bound == Maximum {
                right = center;
                lcp_right = lcp_center;
            } else {
                left = center;
                lcp_left = lcp_center;
            }
        }

        // handle edge case to search at index 0
        if right == 1 && left == 0 {
            let (retval, lcp_center) =
                self.compare(search_string, sa.get(0), min(lcp_left, lcp_right), bound);

            found |= lcp_center == search_string.len();

            if bound == Minimum && retval {
                right = 0;
            }
        }

        match bound {
            Minimum => (found, right),
            Maximum => (found, left),
        }
    }

    /// Searches for the minimum and maximum bound for a string in the suffix array
    ///
    /// # Arguments
    /// * `search_string` - The string/peptide we are searching in the suffix array
    ///
    /// # Returns
    ///
    /// Returns the minimum and maximum bound of all matches in the suffix array, or `NoMatches` if no matches were found
    pub fn search_bounds(&self, search_string: &[u8]) -> BoundSearchResult {
        let (found_min, min_bound) = self.binary_search_bound(Minimum, search_string);

        if !found_min {
            return BoundSearchResult::NoMatches;
        }

        let (_, max_bound) = self.binary_search_bound(Maximum, search_string);

        BoundSearchResult::SearchResult((min_bound, max_bound + 1))
    }

    /// Searches for the suffixes matching a search string
    /// During search I and L can be equated
    ///
    /// # Arguments
    /// * `search_string` - The string/peptide we are searching in the suffix array
    /// * `max_matches` - The maximum amount of matches processed, if more matches are found we don't process them
    /// * `equalize_i_and_l` - True if we want to equate I and L during search, otherwise false
    ///
    /// # Returns
    ///
    /// Returns all the matching suffixes
    pub fn search_matching_suffixes(
        &self,
        search_string: &[u8],
        max_matches: usize,
        equalize_i_and_l: bool,
    ) -> SearchAllSuffixesResult {
        if search_string.is_empty() {
            return SearchAllSuffixesResult::NoMatches;
        }

        // a search string shorter than the sample rate does not necessarily contain a sampled suffix
        if search_string.len() < self.sample_rate() as usize {
            debug!(
                "Scanning the proteins for {}, it is shorter than the sample rate",
                String::from_utf8_lossy(search_string)
            );
            return self.scan_matching_suffixes(search_string, max_matches, equalize_i_and_l);
        }

        let mut matching_suffixes: Vec<i64> = vec![];
        let il_locations: Vec<usize> = search_string
            .iter()
            .enumerate()
            .filter(|(_, &character)| character == b'I' || character == b'L')
            .map(|(i, _)| i)
            .collect();

        for skip in 0..self.sample_rate() as usize {
            let il_locations_start = il_locations.partition_point(|&location| location < skip);
            let il_locations_current_suffix = &il_locations[il_locations_start..];
            let current_search_string_prefix = &search_string[..skip];
            let current_search_string_suffix = &search_string[skip..];

            // if the shorter part is matched, see if what goes before the matched suffix matches the unmatched part of the prefix
            let BoundSearchResult::SearchResult((min_bound, max_bound)) =
                self.search_bounds(current_search_string_suffix)
            else {
                continue;
            };

            // try all the partially matched suffixes and store the matching suffixes in an array (stop when our max number of matches is reached)
            for sa_index in min_bound..max_bound {
                let suffix = self.index.sa.get(sa_index) as usize;
                // filter away matches where I was wrongfully equalized to L, and check the unmatched prefix
                // when the prefix is empty, we don't need to check it at all
                if suffix >= skip
                    && (skip == 0
                        || Self::check_prefix(
                            current_search_string_prefix,
                            &self.proteins.input_string[suffix - skip..suffix],
                            equalize_i_and_l,
                        ))
                    && Self::check_suffix(
                        skip,
                        il_locations_current_suffix,
                        current_search_string_suffix,
                        &self.proteins.input_string[suffix..suffix + search_string.len() - skip],
                        equalize_i_and_l,
                    )
                {
                    matching_suffixes.push((suffix - skip) as i64);

                    // return if max number of matches is reached
                    if matching_suffixes.len() >= max_matches {
                        return SearchAllSuffixesResult::MaxMatches(matching_suffixes);
                    }
                }
            }
        }

        if matching_suffixes.is_empty() {
            SearchAllSuffixesResult::NoMatches
        } else {
            SearchAllSuffixesResult::SearchResult(matching_suffixes)
        }
    }

    /// Finds the matching suffixes by comparing the search string with every position of the text
    fn scan_matching_suffixes(
        &self,
        search_string: &[u8],
        max_matches: usize,
        equalize_i_and_l: bool,
    ) -> SearchAllSuffixesResult {
        let mut matching_suffixes: Vec<i64> = vec![];

        for (suffix, window) in self.proteins.input_string.windows(search_string.len()).enumerate() {
            if Self::check_prefix(search_string, window, equalize_i_and_l) {
                matching_suffixes.push(suffix as i64);

                if matching_suffixes.len() >= max_matches {
                    return SearchAllSuffixesResult::MaxMatches(matching_suffixes);
                }
            }
        }

        if matching_suffixes.is_empty() {
            SearchAllSuffixesResult::NoMatches
        } else {
            SearchAllSuffixesResult::SearchResult(matching_suffixes)
        }
    }

    /// Returns true of the prefixes are the same
    /// if `equalize_i_and_l` is set to true, L and I are considered the same
    ///
    /// # Arguments
    /// * `search_string_prefix` - The unchecked prefix of the string/peptide that is searched
    /// * `index_prefix` - The unchecked prefix from the protein from the suffix array
    /// * `equalize_i_and_l` - True if we want to equate I and L during search, otherwise false
    ///
    /// # Returns
    ///
    /// Returns true if `search_string_prefix` and `index_prefix` are considered the same, otherwise false
    #[inline]
    fn check_prefix(
        search_string_prefix: &[u8],
        index_prefix: &[u8],
        equalize_i_and_l: bool,
    ) -> bool {
        if equalize_i_and_l {
            search_string_prefix.len() == index_prefix.len()
                && search_string_prefix
                    .iter()
                    .zip(index_prefix)
                    .all(|(&search_character, &index_character)| {
                        equal_il(search_character, index_character)
                    })
        } else {
            search_string_prefix == index_prefix
        }
    }

    /// Returns true of the search_string and index_string are equal
    /// This is automatically true if `equalize_i_and_l` is set to true, since there matched during search where I = L
    /// If `equalize_i_and_l` is set to false, we need to check if the I and L locations have the same character
    ///
    /// # Arguments
    /// * `skip` - The used skip factor during the search iteration
    /// * `il_locations` - The locations of the I's and L's in the **original** peptide
    /// * `search_string` - The peptide that is being searched, but already with the skipped prefix removed from it
    /// * `index_string` - The suffix that search_string matches with when I and L were equalized during search
    /// * `equalize_i_and_l` - True if we want to equate I and L during search, otherwise false
    fn check_suffix(
        skip: usize,
        il_locations: &[usize],
        search_string: &[u8],
        index_string: &[u8],
        equalize_i_and_l: bool,
    ) -> bool {
        equalize_i_and_l
            || il_locations.iter().all(|&il_location| {
                let index = il_location - skip;
                search_string[index] == index_string[index]
            })
    }

    /// Returns all the proteins that correspond with the provided suffixes
    ///
    /// # Arguments
    /// * `suffixes` - List of suffix indices
    ///
    /// # Returns
    ///
    /// Returns the proteins that every suffix is a part of
    ///
    /// # Errors
    ///
    /// Returns a `MappingError` if a suffix does not belong to a protein, which means the index
    /// and the proteins are out of sync
    pub fn retrieve_proteins(&self, suffixes: &[i64]) -> Result<Vec<&Protein>, MappingError> {
        suffixes
            .iter()
            .map(|&suffix| self.index.suffix_index_to_protein.resolve(&self.proteins, suffix))
            .collect()
    }

    /// Searches all the matching proteins for a search_string/peptide in the suffix array
    ///
    /// # Arguments
    /// * `search_string` - The string/peptide being searched
    /// * `equalize_i_and_l` - If set to true, I and L are equalized during search
    ///
    /// # Returns
    ///
    /// Returns the matching proteins for the search_string
    pub fn search_proteins_for_peptide(
        &self,
        search_string: &[u8],
        equalize_i_and_l: bool,
    ) -> Result<Vec<&Protein>, MappingError> {
        match self.search_matching_suffixes(search_string, usize::MAX, equalize_i_and_l) {
            SearchAllSuffixesResult::SearchResult(suffixes)
            | SearchAllSuffixesResult::MaxMatches(suffixes) => self.retrieve_proteins(&suffixes),
            SearchAllSuffixesResult::NoMatches => Ok(vec![]),
        }
    }

    /// Retrieves the lowest common ancestor of the taxa of a collection of proteins, snapped to
    /// its closest valid ancestor
    ///
    /// # Arguments
    /// * `proteins` - A collection of proteins
    ///
    /// # Returns
    ///
    /// Returns the aggregated taxon, or `None` if there are no proteins
    pub fn retrieve_lca(&self, proteins: &[&Protein]) -> Option<TaxonId> {
        let taxon_ids: Vec<TaxonId> = proteins.iter().map(|protein| protein.taxon_id).collect();

        self.taxon_aggregator
            .aggregate(taxon_ids)
            .map(|id| self.taxon_aggregator.snap_taxon(id).unwrap_or(id))
    }
}
