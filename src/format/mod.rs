//! Text file formats
//!
//! - [`annotation`]: one timeline per file, export and tolerant import
//! - [`summary`]: one aggregate CSV for a batch of analyzed sources

pub mod annotation;
pub mod summary;

pub use annotation::{
    read_annotation_file, read_annotations, write_annotation_file, write_annotations,
    AnnotationFile,
};
pub use summary::{write_summary, write_summary_file};

use crate::error::TimelineError;
use csv::{Terminator, WriterBuilder};

/// Render rows of uneven length as CSV text with `\n` line endings
pub(crate) fn csv_block(rows: Vec<Vec<String>>) -> Result<String, TimelineError> {
    let mut writer = WriterBuilder::new()
        .flexible(true)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    for row in &rows {
        writer.write_record(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| TimelineError::Io(err.into_error()))?;
    String::from_utf8(bytes).map_err(|err| TimelineError::ParseError(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_csv_block_uneven_rows_and_quoting() {
        let text = csv_block(vec![
            vec!["Metadata".to_string()],
            vec!["a,b".to_string(), "2".to_string(), "".to_string()],
        ])
        .unwrap();
        assert_eq!(text, "Metadata\n\"a,b\",2,\n");
    }
}
