//! CSV dialect shared by every pipeline artifact.
//!
//! Raw and intermediate files use a quoted CSV flavour: every field is
//! enclosed in double quotes, embedded quotes are doubled and line breaks
//! inside a field are collapsed to a single space. Tokenizing is delegated to
//! the `csv` crate; rendering goes through a `csv::Writer` configured to
//! always quote.

use crate::error::{PipelineError, Result};
use csv::{QuoteStyle, ReaderBuilder, StringRecord, WriterBuilder};
use std::io::Write;

/// Delimiter of measuring, normalized and binned files.
pub const DELIMITER: u8 = b';';

/// Delimiter of raw perfmon files.
pub const TAB: u8 = b'\t';

/// Splits single CSV lines into owned fields.
#[derive(Debug, Clone, Copy)]
pub struct LineTokenizer {
    delimiter: u8,
}

impl LineTokenizer {
    pub fn new(delimiter: u8) -> Self {
        Self { delimiter }
    }

    /// Tokenizer for `;`-delimited files.
    pub fn semicolon() -> Self {
        Self::new(DELIMITER)
    }

    /// Tokenizer for tab-delimited files.
    pub fn tab() -> Self {
        Self::new(TAB)
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    /// Split one line into its fields, unquoting them.
    pub fn tokenize(&self, line: &str) -> Result<Vec<String>> {
        let mut reader = ReaderBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(line.as_bytes());

        let mut record = StringRecord::new();
        if !reader.read_record(&mut record)? {
            return Err(PipelineError::MalformedLine(line.to_string()));
        }
        Ok(record.iter().map(str::to_string).collect())
    }
}

/// Replace every run of `\r`/`\n` with one space, dropping a trailing run.
fn collapse_line_breaks(field: &str) -> String {
    let mut collapsed = String::with_capacity(field.len());
    let mut pending_break = false;
    for c in field.chars() {
        if c == '\r' || c == '\n' {
            pending_break = true;
            continue;
        }
        if pending_break {
            collapsed.push(' ');
            pending_break = false;
        }
        collapsed.push(c);
    }
    collapsed
}

fn quoted_writer<W: Write>(delimiter: u8, out: W) -> csv::Writer<W> {
    WriterBuilder::new()
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Always)
        .has_headers(false)
        .from_writer(out)
}

fn collapsed_fields<I, S>(fields: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    fields
        .into_iter()
        .map(|field| collapse_line_breaks(field.as_ref()))
        .collect()
}

/// Render fields as one quoted line without a line terminator.
///
/// ```rust
/// # use loadtest_analyzer::csv_format::quoted_line;
/// assert_eq!(quoted_line(b';', ["a", "say \"hi\""]).unwrap(), "\"a\";\"say \"\"hi\"\"\"");
/// ```
pub fn quoted_line<I, S>(delimiter: u8, fields: I) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut writer = quoted_writer(delimiter, Vec::new());
    writer.write_record(collapsed_fields(fields))?;
    let bytes = writer
        .into_inner()
        .map_err(|e| PipelineError::Write(e.into_error()))?;
    let line = String::from_utf8(bytes)
        .map_err(|e| PipelineError::MalformedLine(format!("rendered line is not UTF-8: {}", e)))?;
    Ok(line.trim_end_matches(&['\r', '\n'][..]).to_string())
}

/// Append one quoted line plus `\n` to `out`.
pub fn write_quoted_line<W, I, S>(out: &mut W, delimiter: u8, fields: I) -> std::io::Result<()>
where
    W: Write + ?Sized,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut writer = quoted_writer(delimiter, out);
    writer.write_record(collapsed_fields(fields))?;
    writer.flush()
}
