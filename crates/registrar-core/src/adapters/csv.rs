//! # CSV
//!
//! Minimal RFC-4180 reader and writer shared by the CSV adapters.
//!
//! Fields may be quoted; inside quotes a doubled `""` is a literal quote and
//! commas and line breaks are data. A leading UTF-8 BOM is ignored, blank
//! lines are skipped and header lookup ignores case and surrounding
//! whitespace.

use crate::error::{RegistrarError, Result};
use std::borrow::Cow;
use std::collections::BTreeMap;

/// One data record and the line it started on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRow {
    /// 1-based line number of the first character of the record.
    pub line: usize,
    fields: Vec<String>,
}

/// A header row plus data rows.
#[derive(Debug, Clone)]
pub struct CsvTable {
    headers: Vec<String>,
    index: BTreeMap<String, usize>,
    rows: Vec<CsvRow>,
}

fn normalize_header(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

impl CsvTable {
    /// Parse `bytes`, requiring every column in `required`.
    pub fn read(bytes: &[u8], required: &[&str]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| RegistrarError::Adapter(format!("file is not valid UTF-8: {e}")))?;
        let mut records = parse_records(text)?.into_iter();
        let Some(header) = records.next() else {
            return Err(RegistrarError::Adapter("file has no header row".into()));
        };

        let headers: Vec<String> = header.fields.iter().map(|h| normalize_header(h)).collect();
        let mut index = BTreeMap::new();
        for (i, name) in headers.iter().enumerate() {
            index.entry(name.clone()).or_insert(i);
        }
        let missing: Vec<&str> = required
            .iter()
            .copied()
            .filter(|col| !index.contains_key(&normalize_header(col)))
            .collect();
        if !missing.is_empty() {
            return Err(RegistrarError::Adapter(format!(
                "missing required column(s): {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            headers,
            index,
            rows: records.collect(),
        })
    }

    /// Normalized header names in file order.
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Data rows.
    #[must_use]
    pub fn rows(&self) -> &[CsvRow] {
        &self.rows
    }

    /// Trimmed value of `column` in `row`, `None` when absent or blank.
    #[must_use]
    pub fn get<'a>(&self, row: &'a CsvRow, column: &str) -> Option<&'a str> {
        let idx = *self.index.get(&normalize_header(column))?;
        row.fields
            .get(idx)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Like [`CsvTable::get`] but parsed with `FromStr`.
    ///
    /// A blank cell is `Ok(None)`; an unparsable one is an error naming the
    /// column.
    pub fn parse<T: std::str::FromStr>(&self, row: &CsvRow, column: &str) -> Result<Option<T>> {
        match self.get(row, column) {
            None => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|_| {
                RegistrarError::validation(format!("{column}: cannot read '{raw}'"))
            }),
        }
    }
}

/// Split text into records.
///
/// Fails only on an unterminated quoted field, which leaves the rest of the
/// file unreadable.
fn parse_records(text: &str) -> Result<Vec<CsvRow>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut records = Vec::new();
    let mut fields: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut quoted = false;
    let mut line = 1;
    let mut record_line = 1;
    let mut chars = text.chars().peekable();

    let mut finish = |fields: &mut Vec<String>, field: &mut String, quoted: &mut bool, at: usize| {
        fields.push(std::mem::take(field));
        let blank = !*quoted && fields.len() == 1 && fields[0].trim().is_empty();
        if !blank {
            records.push(CsvRow {
                line: at,
                fields: std::mem::take(fields),
            });
        }
        fields.clear();
        *quoted = false;
    };

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => {
                in_quotes = true;
                quoted = true;
            }
            ',' => fields.push(std::mem::take(&mut field)),
            '\r' | '\n' => {
                if c == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                finish(&mut fields, &mut field, &mut quoted, record_line);
                line += 1;
                record_line = line;
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(RegistrarError::Adapter(format!(
            "unterminated quoted field starting on line {record_line}"
        )));
    }
    if !field.is_empty() || !fields.is_empty() || quoted {
        finish(&mut fields, &mut field, &mut quoted, record_line);
    }
    Ok(records)
}

/// Quote a field when it holds a comma, quote or line break.
#[must_use]
pub fn escape(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// Accumulates CSV output.
#[derive(Debug, Default)]
pub struct CsvWriter {
    out: String,
}

impl CsvWriter {
    /// Start a file with a header row.
    #[must_use]
    pub fn with_header(columns: &[&str]) -> Self {
        let mut writer = Self::default();
        writer.row(columns.iter().copied());
        writer
    }

    /// Append one record.
    pub fn row<'a>(&mut self, fields: impl IntoIterator<Item = &'a str>) {
        let mut first = true;
        for field in fields {
            if !first {
                self.out.push(',');
            }
            self.out.push_str(&escape(field));
            first = false;
        }
        self.out.push_str("\r\n");
    }

    /// Finished file bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.out.into_bytes()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fields(row: &CsvRow) -> Vec<&str> {
        row.fields.iter().map(String::as_str).collect()
    }

    #[test]
    fn reads_quoted_fields() -> Result<()> {
        let text = "a,b,c\n1,\"two, three\",\"say \"\"hi\"\"\"\n";
        let records = parse_records(text)?;
        assert_eq!(records.len(), 2);
        assert_eq!(fields(&records[1]), vec!["1", "two, three", "say \"hi\""]);
        Ok(())
    }

    #[test]
    fn multiline_field_keeps_line_numbers() -> Result<()> {
        let text = "h1,h2\r\n\"line one\nline two\",x\r\nlast,row\r\n";
        let records = parse_records(text)?;
        assert_eq!(records.len(), 3);
        assert_eq!(fields(&records[1]), vec!["line one\nline two", "x"]);
        assert_eq!(records[1].line, 2);
        assert_eq!(records[2].line, 4);
        Ok(())
    }

    #[test]
    fn skips_bom_and_blank_lines() -> Result<()> {
        let text = "\u{feff}Course_Number , Title\n\n   \nCS 101,Intro\n";
        let table = CsvTable::read(text.as_bytes(), &["course_number", "TITLE"])?;
        assert_eq!(table.headers(), ["course_number", "title"]);
        assert_eq!(table.rows().len(), 1);
        let row = &table.rows()[0];
        assert_eq!(table.get(row, "Course_Number"), Some("CS 101"));
        assert_eq!(table.get(row, "title"), Some("Intro"));
        assert_eq!(table.get(row, "missing"), None);
        Ok(())
    }

    #[test]
    fn repeated_header_reads_first_column() -> Result<()> {
        let table = CsvTable::read(b"term_name,Term_Name\nFall 2025,Spring 2026\n", &["term_name"])?;
        let row = &table.rows()[0];
        assert_eq!(table.get(row, "term_name"), Some("Fall 2025"));
        Ok(())
    }

    #[test]
    fn missing_required_column_fails() {
        let err = CsvTable::read(b"title\nIntro\n", &["course_number", "title"]);
        assert!(matches!(err, Err(RegistrarError::Adapter(msg)) if msg.contains("course_number")));
    }

    #[test]
    fn unterminated_quote_fails() {
        assert!(parse_records("a,b\n\"open,x\n").is_err());
    }

    #[test]
    fn parse_reports_column() -> Result<()> {
        let table = CsvTable::read(b"enrollment\nlots\n\n", &[])?;
        let row = &table.rows()[0];
        let value: Result<Option<u32>> = table.parse(row, "enrollment");
        assert!(matches!(value, Err(RegistrarError::Validation(msg)) if msg.contains("enrollment")));
        Ok(())
    }

    #[test]
    fn writer_quotes_only_when_needed() {
        let mut writer = CsvWriter::with_header(&["a", "b"]);
        writer.row(["plain", "with, comma"]);
        let text = String::from_utf8(writer.into_bytes()).unwrap_or_default();
        assert_eq!(text, "a,b\r\nplain,\"with, comma\"\r\n");
    }

    proptest! {
        #[test]
        fn written_rows_read_back(values in proptest::collection::vec("[a-z ,\"\n]{0,12}", 1..6)) {
            let header: Vec<String> = (0..values.len()).map(|i| format!("c{i}")).collect();
            let header_refs: Vec<&str> = header.iter().map(String::as_str).collect();
            let mut writer = CsvWriter::with_header(&header_refs);
            writer.row(values.iter().map(String::as_str));
            let bytes = writer.into_bytes();
            let records = parse_records(std::str::from_utf8(&bytes).unwrap_or_default());
            prop_assert!(records.is_ok());
            let records = records.unwrap_or_default();

            // A single blank unquoted field is indistinguishable from a blank line.
            let blank_row = values.len() == 1 && values[0].trim().is_empty() && escape(&values[0]) == values[0];
            if blank_row {
                prop_assert_eq!(records.len(), 1);
            } else {
                prop_assert_eq!(records.len(), 2);
                prop_assert_eq!(&records[1].fields, &values);
            }
        }
    }
}
