//! Small protein database and taxonomy shared by the tests of this crate

use std::{fs::File, io::Write};

use sa_mappings::proteins::Proteins;
use sa_mappings::suffix_to_protein_index::SuffixToProteinMappingStyle;
use sa_mappings::taxonomy::{AggregationMethod, TaxonAggregator};
use suffixarray_builder::{build_index, BuildOptions};
use tempdir::TempDir;

use crate::sa_searcher::Searcher;

/// Input string: `MKTAYIAK-MKTAYILK-PEPTIDELAKL-AKLMXK$`
pub fn proteins() -> Proteins {
    Proteins::try_from_records([
        ("P1", 9606, "MKTAYIAK"),
        ("P2", 9598, "MKTAYILK"),
        ("P3", 562, "PEPTIDELAKL"),
        ("P4", 2759, "AKLMXK"),
    ])
    .unwrap()
}

pub fn create_taxonomy_file(tmp_dir: &TempDir) -> String {
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

    taxonomy_file.to_str().unwrap().to_string()
}

pub fn taxon_aggregator(tmp_dir: &TempDir) -> TaxonAggregator {
    TaxonAggregator::try_from_taxonomy_file(&create_taxonomy_file(tmp_dir), AggregationMethod::Lca)
        .unwrap()
}

pub fn create_searcher(
    tmp_dir: &TempDir,
    sample_rate: u8,
    mapping_style: SuffixToProteinMappingStyle,
) -> Searcher {
    let proteins = proteins();
    let options = BuildOptions { sample_rate, mapping_style, ..BuildOptions::default() };
    let index = build_index(&proteins, &options).unwrap();

    Searcher::new(index, proteins, taxon_aggregator(tmp_dir)).unwrap()
}
