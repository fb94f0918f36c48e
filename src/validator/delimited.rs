//! Delimited-text (CSV) validation.

use std::collections::HashSet;

use csv::ReaderBuilder;

use super::Validator;
use crate::error::ValidationFailure;
use crate::types::Verdict;

/// Malformed rows reported individually before the rest are summarized
const DEFAULT_MAX_ROW_ERRORS: usize = 20;

/// Validator for CSV content with a header row
///
/// Checks, in order: non-empty content, UTF-8 encoding, a readable header row,
/// the expected column set (when configured), and that every data row has as
/// many fields as the header.
#[derive(Clone, Debug)]
pub struct CsvValidator {
    delimiter: u8,
    expected_columns: Option<Vec<String>>,
    max_row_errors: usize,
}

impl Default for CsvValidator {
    fn default() -> Self {
        Self {
            delimiter: b',',
            expected_columns: None,
            max_row_errors: DEFAULT_MAX_ROW_ERRORS,
        }
    }
}

impl CsvValidator {
    /// Comma-delimited validator without a column schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different field delimiter
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Require these header columns (order-insensitive)
    pub fn with_expected_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expected_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Report at most `max` malformed rows individually
    pub fn with_max_row_errors(mut self, max: usize) -> Self {
        self.max_row_errors = max;
        self
    }

    fn check_columns(&self, headers: &[String], verdict: &mut Verdict) {
        let mut seen = HashSet::new();
        for (index, name) in headers.iter().enumerate() {
            if name.trim().is_empty() {
                verdict
                    .warnings
                    .push(format!("column {} has an empty header", index + 1));
            } else if !seen.insert(name.as_str()) {
                verdict.warnings.push(format!("duplicate column: {name}"));
            }
        }

        let Some(expected) = &self.expected_columns else {
            return;
        };
        let present: HashSet<&str> = headers.iter().map(|h| h.trim()).collect();
        let wanted: HashSet<&str> = expected.iter().map(|c| c.trim()).collect();

        for column in expected {
            if !present.contains(column.trim()) {
                verdict.errors.push(format!("missing column: {column}"));
            }
        }
        for header in headers {
            if !header.trim().is_empty() && !wanted.contains(header.trim()) {
                verdict.warnings.push(format!("unexpected column: {header}"));
            }
        }
    }
}

impl Validator for CsvValidator {
    fn validate(&self, content: &[u8]) -> Result<Verdict, ValidationFailure> {
        let mut verdict = Verdict::default();

        if content.trim_ascii().is_empty() {
            verdict.errors.push("CSV content is empty".to_string());
            return Ok(verdict);
        }
        if let Err(e) = std::str::from_utf8(content) {
            verdict
                .errors
                .push(format!("content is not valid UTF-8: {e}"));
            return Ok(verdict);
        }

        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(content);

        let headers: Vec<String> = match reader.headers() {
            Ok(record) => record.iter().map(str::to_string).collect(),
            Err(e) => {
                verdict.errors.push(format!("cannot read header row: {e}"));
                return Ok(verdict);
            }
        };
        self.check_columns(&headers, &mut verdict);

        let mut rows = 0usize;
        let mut malformed = 0usize;
        for (index, result) in reader.records().enumerate() {
            let problem = match result {
                Ok(record) => {
                    rows += 1;
                    if record.len() == headers.len() {
                        continue;
                    }
                    let line = record
                        .position()
                        .map(|p| p.line())
                        .unwrap_or(index as u64 + 2);
                    format!(
                        "row {line}: expected {} fields, found {}",
                        headers.len(),
                        record.len()
                    )
                }
                Err(e) => format!("row {}: {e}", index + 2),
            };

            malformed += 1;
            if malformed <= self.max_row_errors {
                verdict.errors.push(problem);
            }
        }
        if malformed > self.max_row_errors {
            verdict.errors.push(format!(
                "{} more malformed rows not shown",
                malformed - self.max_row_errors
            ));
        }

        if rows == 0 {
            verdict
                .warnings
                .push("CSV has a header row but no data rows".to_string());
        }

        verdict.info.push("CSV read successfully".to_string());
        verdict
            .info
            .push(format!("{rows} data rows, {} columns", headers.len()));
        Ok(verdict)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValidationState;

    #[test]
    fn empty_and_whitespace_content_is_invalid() {
        let validator = CsvValidator::new();
        for content in [&b""[..], b"   \n\t\n"] {
            let verdict = validator.validate(content).unwrap();
            assert_eq!(verdict.state(), ValidationState::Invalid);
            assert_eq!(verdict.errors, vec!["CSV content is empty".to_string()]);
        }
    }

    #[test]
    fn well_formed_csv_is_valid() {
        let verdict = CsvValidator::new()
            .validate(b"id,name,amount\n1,alpha,10\n2,beta,20\n")
            .unwrap();

        assert_eq!(verdict.state(), ValidationState::Valid);
        assert!(verdict.warnings.is_empty());
        assert_eq!(
            verdict.info,
            vec![
                "CSV read successfully".to_string(),
                "2 data rows, 3 columns".to_string()
            ]
        );
    }

    #[test]
    fn ragged_rows_are_errors_with_line_numbers() {
        let verdict = CsvValidator::new()
            .validate(b"id,name\n1,alpha\n2\n3,gamma,extra\n")
            .unwrap();

        assert_eq!(verdict.state(), ValidationState::Invalid);
        assert_eq!(
            verdict.errors,
            vec![
                "row 3: expected 2 fields, found 1".to_string(),
                "row 4: expected 2 fields, found 3".to_string(),
            ]
        );
    }

    #[test]
    fn row_errors_are_capped() {
        let mut content = String::from("a,b\n");
        for _ in 0..10 {
            content.push_str("only-one\n");
        }
        let verdict = CsvValidator::new()
            .with_max_row_errors(3)
            .validate(content.as_bytes())
            .unwrap();

        assert_eq!(verdict.errors.len(), 4);
        assert_eq!(verdict.errors[3], "7 more malformed rows not shown");
    }

    #[test]
    fn expected_columns_report_missing_and_unexpected() {
        let verdict = CsvValidator::new()
            .with_expected_columns(["id", "amount"])
            .validate(b"id,name\n1,alpha\n")
            .unwrap();

        assert_eq!(verdict.errors, vec!["missing column: amount".to_string()]);
        assert_eq!(verdict.warnings, vec!["unexpected column: name".to_string()]);
    }

    #[test]
    fn custom_delimiter_is_honored() {
        let verdict = CsvValidator::new()
            .with_delimiter(b';')
            .validate(b"id;name\n1;alpha\n")
            .unwrap();
        assert_eq!(verdict.state(), ValidationState::Valid);
        assert_eq!(verdict.info[1], "1 data rows, 2 columns");
    }

    #[test]
    fn garbage_bytes_are_invalid_not_a_crash() {
        let verdict = CsvValidator::new()
            .validate(&[0xff, 0xfe, 0x00, 0x80])
            .unwrap();
        assert_eq!(verdict.state(), ValidationState::Invalid);
        assert!(verdict.errors[0].starts_with("content is not valid UTF-8"));
    }

    #[test]
    fn header_only_file_warns() {
        let verdict = CsvValidator::new().validate(b"id,name\n").unwrap();
        assert_eq!(verdict.state(), ValidationState::Valid);
        assert_eq!(
            verdict.warnings,
            vec!["CSV has a header row but no data rows".to_string()]
        );
    }

    #[test]
    fn duplicate_and_blank_headers_warn() {
        let verdict = CsvValidator::new().validate(b"id,,id\n1,2,3\n").unwrap();
        assert_eq!(
            verdict.warnings,
            vec![
                "column 2 has an empty header".to_string(),
                "duplicate column: id".to_string()
            ]
        );
    }
}
