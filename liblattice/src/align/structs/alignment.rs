use serde::{Deserialize, Serialize};

/// Stands in for the missing reference word of an insertion.
pub const INSERTION_MARKER: &str = "INS";
/// Stands in for the missing lattice word of a deletion.
pub const DELETION_MARKER: &str = "DEL";

/// One column of an alignment between a reference and a lattice path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlignmentStep {
    Match { word: String },
    Substitution { reference: String, lattice: String },
    /// A lattice word with no reference word
    Insertion { lattice: String },
    /// A reference word with no lattice word
    Deletion { reference: String },
}

impl AlignmentStep {
    /// A match or a substitution, depending on whether the words agree.
    pub fn aligned(reference: &str, lattice: &str) -> Self {
        if reference == lattice {
            AlignmentStep::Match {
                word: reference.to_string(),
            }
        } else {
            AlignmentStep::Substitution {
                reference: reference.to_string(),
                lattice: lattice.to_string(),
            }
        }
    }

    /// The (reference, lattice) word pair, with `INS`/`DEL` for the missing side.
    pub fn pair(&self) -> (&str, &str) {
        match self {
            AlignmentStep::Match { word } => (word, word),
            AlignmentStep::Substitution { reference, lattice } => (reference, lattice),
            AlignmentStep::Insertion { lattice } => (INSERTION_MARKER, lattice),
            AlignmentStep::Deletion { reference } => (reference, DELETION_MARKER),
        }
    }

    pub fn is_error(&self) -> bool {
        !matches!(self, AlignmentStep::Match { .. })
    }

    /// The marker shown between the words: `|` for a match, `S`, `I` or `D` for errors.
    pub fn marker(&self) -> char {
        match self {
            AlignmentStep::Match { .. } => '|',
            AlignmentStep::Substitution { .. } => 'S',
            AlignmentStep::Insertion { .. } => 'I',
            AlignmentStep::Deletion { .. } => 'D',
        }
    }
}

/// The result of aligning a reference against every path in a lattice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinimumError {
    /// The minimum number of word errors over all lattice paths
    pub errors: usize,
    /// The alignment against the lattice path that achieves `errors`
    pub steps: Vec<AlignmentStep>,
}

impl MinimumError {
    /// The number of reference words that were aligned.
    pub fn reference_length(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| !matches!(s, AlignmentStep::Insertion { .. }))
            .count()
    }

    /// The word error rate: errors per reference word.
    pub fn error_rate(&self) -> f64 {
        match self.reference_length() {
            0 => 0.0,
            length => self.errors as f64 / length as f64,
        }
    }

    /// Renders the alignment as three rows: the reference words, a
    /// marker line (`|` for a match, `S`, `I` or `D` for errors), and
    /// the lattice words. Each column is padded to its widest word.
    pub fn display_strings(&self) -> (String, String, String) {
        let mut reference_string = String::new();
        let mut middle_string = String::new();
        let mut lattice_string = String::new();

        for (idx, step) in self.steps.iter().enumerate() {
            let (reference, lattice) = step.pair();
            let width = reference.len().max(lattice.len());

            if idx > 0 {
                reference_string.push(' ');
                middle_string.push(' ');
                lattice_string.push(' ');
            }

            reference_string.push_str(&format!("{reference:<width$}"));
            middle_string.push_str(&format!("{:<width$}", step.marker()));
            lattice_string.push_str(&format!("{lattice:<width$}"));
        }

        (reference_string, middle_string, lattice_string)
    }
}
