//! This module provides a `TaxonAggregator` struct that is used to aggregate taxonomic information.
//! It uses a taxonomy file to create a taxonomic tree and reduces the taxa of matched proteins to
//! a single consensus taxon.

use std::error::Error;

use clap::ValueEnum;
use tracing::debug;
use umgap::{
    agg::{count, MultiThreadSafeAggregator},
    rmq::{lca::LCACalculator, mix::MixCalculator},
    taxon::{read_taxa_file, TaxonId, TaxonList, TaxonTree},
};

/// The taxon id of the root of every taxonomy
pub const ROOT_TAXON: TaxonId = 1;

/// A struct that represents a taxon aggregator.
pub struct TaxonAggregator {
    /// A vector that contains the snapped taxon IDs.
    snapping: Vec<Option<TaxonId>>,

    /// The aggregator used to aggregate taxon IDs.
    aggregator: Box<dyn MultiThreadSafeAggregator>,

    /// The taxon list.
    taxon_list: TaxonList,
}

/// An enum that specifies the aggregation method to use.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregationMethod {
    /// The Lowest Common Ancestor (LCA) aggregation method.
    #[default]
    Lca,

    /// The LCA* aggregation method.
    LcaStar,
}

impl TaxonAggregator {
    /// Creates a new `TaxonAggregator` from a taxonomy file and an aggregation method.
    ///
    /// # Arguments
    ///
    /// * `file` - A string slice that represents the path to the taxonomy file.
    /// * `method` - An `AggregationMethod` enum that specifies the aggregation method to use.
    ///
    /// # Returns
    ///
    /// Returns a `Result` containing the `TaxonAggregator`
    ///
    /// # Errors
    ///
    /// Returns a `Box<dyn Error>` if an error occurred while reading the taxonomy file.
    pub fn try_from_taxonomy_file(
        file: &str,
        method: AggregationMethod,
    ) -> Result<Self, Box<dyn Error>> {
        let taxons = read_taxa_file(file)?;
        debug!("Read {} taxa from {file}", taxons.len());

        let taxon_tree = TaxonTree::new(&taxons);
        let taxon_list = TaxonList::new(taxons);
        let snapping = taxon_tree.snapping(&taxon_list, true);

        let aggregator: Box<dyn MultiThreadSafeAggregator> = match method {
            AggregationMethod::Lca => Box::new(MixCalculator::new(taxon_tree, 1.0)),
            AggregationMethod::LcaStar => Box::new(LCACalculator::new(taxon_tree)),
        };

        Ok(Self {
            snapping,
            aggregator,
            taxon_list,
        })
    }

    /// Checks if a taxon exists in the taxon list.
    ///
    /// # Arguments
    ///
    /// * `taxon` - The taxon ID to check.
    ///
    /// # Returns
    ///
    /// Returns a boolean value indicating whether the taxon exists in the taxon list.
    pub fn taxon_exists(&self, taxon: TaxonId) -> bool {
        self.taxon_list.get(taxon).is_some()
    }

    /// Snaps a taxon to its closest ranked ancestor in the taxonomic tree.
    ///
    /// # Returns
    ///
    /// Returns the snapped taxon ID, or `None` if the taxon is not part of the taxonomy.
    pub fn snap_taxon(&self, taxon: TaxonId) -> Option<TaxonId> {
        self.snapping.get(taxon).copied().flatten()
    }

    /// Aggregates a list of taxon IDs using the configured aggregation method.
    /// Taxa in disjoint subtrees aggregate to the root.
    ///
    /// # Arguments
    ///
    /// * `taxa` - A vector of taxon IDs to aggregate.
    ///
    /// # Returns
    ///
    /// Returns the aggregated taxon ID, or `None` if `taxa` is empty.
    pub fn aggregate(&self, taxa: Vec<TaxonId>) -> Option<TaxonId> {
        if taxa.is_empty() {
            return None;
        }

        let count = count(taxa.into_iter().map(|t| (t, 1.0)));
        self.aggregator.aggregate(&count).ok()
    }
}

#[cfg(test)]
mod tests {
    use std::{fs::File, io::Write, path::PathBuf};

    use tempdir::TempDir;

    use super::*;

    fn create_taxonomy_file(tmp_dir: &TempDir) -> PathBuf {
        let taxonomy_file = tmp_dir.path().join("taxonomy.tsv");
        let mut file = File::create(&taxonomy_file).unwrap();

        writeln!(file, "1\troot\tno rank\t1\t\x01").unwrap();
        writeln!(file, "2\tBacteria\tsuperkingdom\t1\t\x01").unwrap();
        writeln!(file, "562\tEscherichia coli\tspecies\t2\t\x01").unwrap();
        writeln!(file, "2759\tEukaryota\tsuperkingdom\t1\t\x01").unwrap();
        writeln!(file, "9604\tHominidae\tno rank\t2759\t\x01").unwrap();
        writeln!(file, "207598\tHomininae\tno rank\t9604\t\x01").unwrap();
        writeln!(file, "9605\tHomo\tgenus\t207598\t\x01").unwrap();
        writeln!(file, "9606\tHomo sapiens\tspecies\t9605\t\x01").unwrap();
        writeln!(file, "9596\tPan\tgenus\t207598\t\x01").unwrap();
        writeln!(file, "9598\tPan troglodytes\tspecies\t9596\t\x01").unwrap();

        taxonomy_file
    }

    fn aggregator(tmp_dir: &TempDir, method: AggregationMethod) -> TaxonAggregator {
        let taxonomy_file = create_taxonomy_file(tmp_dir);
        TaxonAggregator::try_from_taxonomy_file(taxonomy_file.to_str().unwrap(), method).unwrap()
    }

    #[test]
    fn test_try_from_taxonomy_file() {
        let tmp_dir = TempDir::new("test_try_from_taxonomy_file").unwrap();

        let _ = aggregator(&tmp_dir, AggregationMethod::Lca);
        let _ = aggregator(&tmp_dir, AggregationMethod::LcaStar);
    }

    #[test]
    fn test_aggregate_lca_star() {
        let tmp_dir = TempDir::new("test_aggregate_lca_star").unwrap();
        let taxon_aggregator = aggregator(&tmp_dir, AggregationMethod::LcaStar);

        // an ancestor on the lineage of the other taxon is absorbed by its descendant
        assert_eq!(taxon_aggregator.aggregate(vec![9606, 9605]), Some(9606));
        assert_eq!(taxon_aggregator.aggregate(vec![9606, 9598]), Some(207598));
        assert_eq!(taxon_aggregator.aggregate(vec![9606, 562]), Some(ROOT_TAXON));
        assert_eq!(taxon_aggregator.aggregate(vec![]), None);
    }

    #[test]
    fn test_missing_taxonomy_file() {
        let result =
            TaxonAggregator::try_from_taxonomy_file("/nonexistent/taxonomy.tsv", AggregationMethod::Lca);
        assert!(result.is_err());
    }

    #[test]
    fn test_taxon_exists() {
        let tmp_dir = TempDir::new("test_taxon_exists").unwrap();
        let taxon_aggregator = aggregator(&tmp_dir, AggregationMethod::Lca);

        for taxon in [1, 2, 562, 2759, 9604, 207598, 9605, 9606, 9596, 9598] {
            assert!(taxon_aggregator.taxon_exists(taxon));
        }
        for taxon in [0, 3, 9597, 100_000] {
            assert!(!taxon_aggregator.taxon_exists(taxon));
        }
    }

    #[test]
    fn test_snap_taxon() {
        let tmp_dir = TempDir::new("test_snap_taxon").unwrap();
        let taxon_aggregator = aggregator(&tmp_dir, AggregationMethod::Lca);

        assert_eq!(taxon_aggregator.snap_taxon(9606), Some(9606));
        assert_eq!(taxon_aggregator.snap_taxon(2), Some(2));
        assert_eq!(taxon_aggregator.snap_taxon(3), None);
        assert_eq!(taxon_aggregator.snap_taxon(10_000_000), None);
    }

    #[test]
    fn test_aggregate_lca() {
        let tmp_dir = TempDir::new("test_aggregate_lca").unwrap();
        let taxon_aggregator = aggregator(&tmp_dir, AggregationMethod::Lca);

        assert_eq!(taxon_aggregator.aggregate(vec![9606]), Some(9606));
        assert_eq!(taxon_aggregator.aggregate(vec![9606, 9606]), Some(9606));
        assert_eq!(taxon_aggregator.aggregate(vec![9606, 9598]), Some(207598));
        assert_eq!(taxon_aggregator.aggregate(vec![9606, 9605]), Some(9605));
        assert_eq!(taxon_aggregator.aggregate(vec![9606, 562]), Some(ROOT_TAXON));
    }

    #[test]
    fn test_aggregate_lca_is_monotonic() {
        let tmp_dir = TempDir::new("test_aggregate_lca_is_monotonic").unwrap();
        let taxon_aggregator = aggregator(&tmp_dir, AggregationMethod::Lca);

        // adding taxa can only move the result up the tree
        assert_eq!(taxon_aggregator.aggregate(vec![9606, 9598, 2759]), Some(2759));
        assert_eq!(taxon_aggregator.aggregate(vec![9606, 9598, 2759, 562]), Some(ROOT_TAXON));
    }

    #[test]
    fn test_aggregate_empty() {
        let tmp_dir = TempDir::new("test_aggregate_empty").unwrap();
        let taxon_aggregator = aggregator(&tmp_dir, AggregationMethod::Lca);

        assert_eq!(taxon_aggregator.aggregate(vec![]), None);
    }
}
