//! This library provides the protein corpus that is indexed, the taxonomy used to aggregate the
//! taxa of matched proteins and the mappings from suffixes back to proteins.

#![warn(missing_docs)]

pub mod proteins;
pub mod suffix_to_protein_index;
pub mod taxonomy;
