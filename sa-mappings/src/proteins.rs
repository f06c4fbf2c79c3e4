//! This module contains the `Protein` and `Proteins` structs, which are used to represent proteins
//! and the concatenated corpus they are stored in.

use std::{error::Error, fs::File, io::BufReader, ops::Index, str::from_utf8};

use bytelines::ByteLines;
use get_size::GetSize;
use thiserror::Error;
use tracing::{debug, info};
use umgap::taxon::TaxonId;

use crate::taxonomy::TaxonAggregator;

/// The separation character used in the input string
pub static SEPARATION_CHARACTER: u8 = b'-';

/// The termination character used in the input string
/// This character should be smaller than the separation character
pub static TERMINATION_CHARACTER: u8 = b'$';

/// A struct that represents a protein and its linked information
#[derive(Debug, GetSize, PartialEq, Eq)]
pub struct Protein {
    /// The id of the protein
    pub uniprot_id: String,

    /// start position and length of the protein in the input string
    pub sequence: (usize, u32),

    /// the taxon id of the protein
    pub taxon_id: TaxonId,
}

/// A struct that represents a collection of proteins
#[derive(Debug, GetSize)]
pub struct Proteins {
    /// The input string containing all proteins
    pub input_string: Vec<u8>,

    /// The proteins in the input string
    pub proteins: Vec<Protein>,
}

/// Errors that make a protein record unusable as part of the corpus
#[derive(Debug, Error, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum DatabaseFormatError {
    /// A line has fewer than three tab separated fields
    #[error("line {line}: expected the fields <accession>\\t<taxon id>\\t<sequence>, missing the {field}")]
    MissingField { line: usize, field: &'static str },

    /// A sequence contains a byte that is not an ASCII letter
    #[error("protein {accession}: the sequence may only contain letters, found {symbol:?} at position {position}")]
    InvalidSequence {
        accession: String,
        symbol: char,
        position: usize,
    },

    #[error("protein {accession}: a sequence longer than {} residues is not supported", u32::MAX)]
    SequenceTooLong { accession: String },
}

impl Proteins {
    /// Concatenates the given records into a corpus
    ///
    /// # Arguments
    /// * `records` - Tuples of accession, taxon id and sequence, in corpus order
    ///
    /// # Errors
    ///
    /// Returns a `DatabaseFormatError` if a sequence contains something other than ASCII letters,
    /// which guarantees that the separation and termination characters never occur in a protein
    pub fn try_from_records<I, S>(records: I) -> Result<Self, DatabaseFormatError>
    where
        I: IntoIterator<Item = (S, TaxonId, S)>,
        S: AsRef<str>,
    {
        let mut proteins = Self {
            input_string: Vec::new(),
            proteins: Vec::new(),
        };

        for (uniprot_id, taxon_id, sequence) in records {
            proteins.push(uniprot_id.as_ref(), taxon_id, sequence.as_ref().as_bytes())?;
        }

        proteins.finish();
        Ok(proteins)
    }

    /// Creates a new `Proteins` struct from a database file and a `TaxonAggregator`.
    /// Proteins with a taxon id that does not exist in the taxonomy are skipped.
    ///
    /// # Arguments
    /// * `file` - The path to the database file
    /// * `taxon_aggregator` - The `TaxonAggregator` to use
    ///
    /// # Returns
    ///
    /// Returns a `Result` containing the `Proteins` struct
    ///
    /// # Errors
    ///
    /// Returns a `Box<dyn Error>` if an error occurred while reading the database file
    pub fn try_from_database_file(
        file: &str,
        taxon_aggregator: &TaxonAggregator,
    ) -> Result<Self, Box<dyn Error>> {
        let mut proteins = Self {
            input_string: Vec::new(),
            proteins: Vec::new(),
        };
        let mut skipped: usize = 0;

        let file = File::open(file)?;

        // Read the lines as bytes, lines that are not valid utf8 are rejected field by field
        let mut lines = ByteLines::new(BufReader::new(file));
        let mut line_number = 0;

        while let Some(line) = lines.next() {
            let line = line?;
            line_number += 1;

            if line.is_empty() {
                continue;
            }

            let mut fields = line.split(|b| *b == b'\t');
            let mut next_field = |field: &'static str| {
                fields.next().ok_or(DatabaseFormatError::MissingField {
                    line: line_number,
                    field,
                })
            };

            let uniprot_id = from_utf8(next_field("accession")?)?;
            let taxon_id = from_utf8(next_field("taxon id")?)?.trim().parse::<TaxonId>()?;
            let sequence = next_field("sequence")?;

            if !taxon_aggregator.taxon_exists(taxon_id) {
                debug!("Skipped protein {uniprot_id} with unknown taxon id {taxon_id}");
                skipped += 1;
                continue;
            }

            proteins.push(uniprot_id, taxon_id, sequence)?;
        }

        proteins.finish();

        info!(
            "Read {} proteins ({} residues), skipped {} proteins with an unknown taxon",
            proteins.len(),
            proteins.input_string.len(),
            skipped
        );

        Ok(proteins)
    }

    /// Appends one protein, followed by a separation character, to the input string
    fn push(
        &mut self,
        uniprot_id: &str,
        taxon_id: TaxonId,
        sequence: &[u8],
    ) -> Result<(), DatabaseFormatError> {
        if let Some(position) = sequence.iter().position(|c| !c.is_ascii_alphabetic()) {
            return Err(DatabaseFormatError::InvalidSequence {
                accession: uniprot_id.to_string(),
                symbol: sequence[position] as char,
                position,
            });
        }

        let length = u32::try_from(sequence.len()).map_err(|_| {
            DatabaseFormatError::SequenceTooLong {
                accession: uniprot_id.to_string(),
            }
        })?;

        let start_index = self.input_string.len();
        self.input_string.extend(sequence.iter().map(u8::to_ascii_uppercase));
        self.input_string.push(SEPARATION_CHARACTER);

        self.proteins.push(Protein {
            uniprot_id: uniprot_id.to_string(),
            sequence: (start_index, length),
            taxon_id,
        });

        Ok(())
    }

    /// Replaces the trailing separation character with the termination character
    fn finish(&mut self) {
        self.input_string.pop();
        self.input_string.push(TERMINATION_CHARACTER);
        self.input_string.shrink_to_fit();
        self.proteins.shrink_to_fit();
    }

    /// Returns the sequence of a protein
    ///
    /// # Arguments
    /// * `protein` - The protein to get the sequence from
    ///
    /// # Returns
    ///
    /// Returns the upper-cased residues of the protein
    pub fn get_sequence(&self, protein: &Protein) -> &[u8] {
        let (start, length) = protein.sequence;
        &self.input_string[start..start + length as usize]
    }

    /// Returns the amount of proteins
    pub fn len(&self) -> usize {
        self.proteins.len()
    }

    /// Returns true if the corpus does not contain any protein
    pub fn is_empty(&self) -> bool {
        self.proteins.is_empty()
    }
}

impl Index<usize> for Proteins {
    type Output = Protein;

    fn index(&self, index: usize) -> &Self::Output {
        &self.proteins[index]
    }
}

#[cfg(test)]
mod tests {
    use std::{fs::File, io::Write, path::PathBuf};

    use tempdir::TempDir;

    use super::*;
    use crate::taxonomy::AggregationMethod;

    fn create_database_file(tmp_dir: &TempDir) -> PathBuf {
        let database_file = tmp_dir.path().join("database.tsv");
        let mut file = File::create(&database_file).unwrap();

        writeln!(file, "P12345\t1\tMLPGLALLLLAAWTARALEV").unwrap();
        writeln!(file, "P54321\t2\tPTDGNAGLLAEPQIAMFCGRLNMHMNVQNG\tignored").unwrap();
        writeln!(file, "P99999\t3\tMKTAYIAK").unwrap();
        writeln!(file, "P67890\t6\tkwdsdpsgtktcidt").unwrap();
        writeln!(file, "P13579\t17\tKEGILQYCQEVYPELQITNVVEANQPVTIQNWCKRGRKQCKTHPH").unwrap();

        database_file
    }

    fn create_taxonomy_file(tmp_dir: &TempDir) -> PathBuf {
        let taxonomy_file = tmp_dir.path().join("taxonomy.tsv");
        let mut file = File::create(&taxonomy_file).unwrap();

        writeln!(file, "1\troot\tno rank\t1\t\x01").unwrap();
        writeln!(file, "2\tBacteria\tsuperkingdom\t1\t\x01").unwrap();
        writeln!(file, "6\tAzorhizobium\tgenus\t1\t\x01").unwrap();
        writeln!(file, "7\tAzorhizobium caulinodans\tspecies\t6\t\x01").unwrap();
        writeln!(file, "9\tBuchnera aphidicola\tspecies\t6\t\x01").unwrap();
        writeln!(file, "10\tCellvibrio\tgenus\t6\t\x01").unwrap();
        writeln!(file, "11\tCellulomonas gilvus\tspecies\t10\t\x01").unwrap();
        writeln!(file, "13\tDictyoglomus\tgenus\t11\t\x01").unwrap();
        writeln!(file, "14\tDictyoglomus thermophilum\tspecies\t10\t\x01").unwrap();
        writeln!(file, "16\tMethylophilus\tgenus\t14\t\x01").unwrap();
        writeln!(file, "17\tMethylophilus methylotrophus\tspecies\t16\t\x01").unwrap();
        writeln!(file, "18\tPelobacter\tgenus\t17\t\x01").unwrap();
        writeln!(file, "19\tSyntrophotalea carbinolica\tspecies\t17\t\x01").unwrap();
        writeln!(file, "20\tPhenylobacterium\tgenus\t19\t\x01").unwrap();

        taxonomy_file
    }

    fn load_proteins(tmp_dir: &TempDir) -> Proteins {
        let database_file = create_database_file(tmp_dir);
        let taxonomy_file = create_taxonomy_file(tmp_dir);

        let taxon_aggregator = TaxonAggregator::try_from_taxonomy_file(
            taxonomy_file.to_str().unwrap(),
            AggregationMethod::Lca,
        )
        .unwrap();

        Proteins::try_from_database_file(database_file.to_str().unwrap(), &taxon_aggregator)
            .unwrap()
    }

    #[test]
    fn test_try_from_records() {
        let proteins =
            Proteins::try_from_records([("P1", 9606, "MKTAYIAK"), ("P2", 9598, "mktayilk")])
                .unwrap();

        assert_eq!(proteins.input_string, b"MKTAYIAK-MKTAYILK$");
        assert_eq!(proteins.len(), 2);
        assert_eq!(proteins[0].sequence, (0, 8));
        assert_eq!(proteins[1].sequence, (9, 8));
        assert_eq!(proteins[1].taxon_id, 9598);
        assert_eq!(proteins.get_sequence(&proteins[1]), b"MKTAYILK");
    }

    #[test]
    fn test_try_from_records_rejects_separator_in_sequence() {
        let result = Proteins::try_from_records([("P1", 1, "MKT-AY")]);

        assert_eq!(
            result.unwrap_err(),
            DatabaseFormatError::InvalidSequence {
                accession: "P1".to_string(),
                symbol: '-',
                position: 3
            }
        );
    }

    #[test]
    fn test_empty_records() {
        let proteins = Proteins::try_from_records(Vec::<(&str, TaxonId, &str)>::new()).unwrap();

        assert!(proteins.is_empty());
        assert_eq!(proteins.input_string, b"$");
    }

    #[test]
    fn test_get_sequence() {
        let tmp_dir = TempDir::new("test_get_sequences").unwrap();
        let proteins = load_proteins(&tmp_dir);

        assert_eq!(proteins.get_sequence(&proteins[0]), b"MLPGLALLLLAAWTARALEV");
        assert_eq!(proteins.get_sequence(&proteins[1]), b"PTDGNAGLLAEPQIAMFCGRLNMHMNVQNG");
        assert_eq!(proteins.get_sequence(&proteins[2]), b"KWDSDPSGTKTCIDT");
        assert_eq!(
            proteins.get_sequence(&proteins[3]),
            b"KEGILQYCQEVYPELQITNVVEANQPVTIQNWCKRGRKQCKTHPH"
        );
    }

    #[test]
    fn test_unknown_taxa_are_skipped() {
        let tmp_dir = TempDir::new("test_unknown_taxa").unwrap();
        let proteins = load_proteins(&tmp_dir);

        // P99999 has taxon id 3, which is not part of the taxonomy
        assert_eq!(proteins.len(), 4);
        assert!(proteins.proteins.iter().all(|protein| protein.uniprot_id != "P99999"));
    }

    #[test]
    fn test_get_taxon() {
        let tmp_dir = TempDir::new("test_get_taxon").unwrap();
        let proteins = load_proteins(&tmp_dir);

        let taxa = vec![1, 2, 6, 17];
        for (i, protein) in proteins.proteins.iter().enumerate() {
            assert_eq!(protein.taxon_id, taxa[i]);
        }
    }

    #[test]
    fn test_input_string_layout() {
        let tmp_dir = TempDir::new("test_input_string_layout").unwrap();
        let proteins = load_proteins(&tmp_dir);

        let separators = proteins
            .input_string
            .iter()
            .filter(|&&c| c == SEPARATION_CHARACTER)
            .count();
        assert_eq!(separators, proteins.len() - 1);
        assert_eq!(proteins.input_string.last(), Some(&TERMINATION_CHARACTER));
    }

    #[test]
    fn test_missing_field() {
        let tmp_dir = TempDir::new("test_missing_field").unwrap();
        let database_file = tmp_dir.path().join("database.tsv");
        let mut file = File::create(&database_file).unwrap();
        writeln!(file, "P12345\t1").unwrap();

        let taxonomy_file = create_taxonomy_file(&tmp_dir);
        let taxon_aggregator = TaxonAggregator::try_from_taxonomy_file(
            taxonomy_file.to_str().unwrap(),
            AggregationMethod::Lca,
        )
        .unwrap();

        let error =
            Proteins::try_from_database_file(database_file.to_str().unwrap(), &taxon_aggregator)
                .unwrap_err();
        assert_eq!(
            error.to_string(),
            "line 1: expected the fields <accession>\\t<taxon id>\\t<sequence>, missing the sequence"
        );
    }
}
