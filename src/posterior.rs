//! Read-only access to the posterior sample of a completed inference run:
//! the trace log (named numeric columns, one row per retained sample) and the
//! tree log (one tree per retained sample).

use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::error::{AdequacyError, PpResult};
use crate::newick::parse_tree_log;
use crate::tree::Tree;

/// Tabular record of sampled parameter values.
///
/// Columns are named, numeric, and of equal length; the first column is
/// conventionally the sample number.
#[derive(Debug, Clone)]
pub struct TraceTable {
    labels: Vec<String>,
    columns: Vec<Vec<f64>>,
    index: HashMap<String, usize>,
}

impl TraceTable {
    /// Read a trace log from disk, discarding `burn_in_percentage` percent of
    /// the leading rows.
    pub fn from_path<P: AsRef<Path>>(path: P, burn_in_percentage: u8) -> PpResult<Self> {
        let file = fs::File::open(path.as_ref())?;
        let table = Self::from_reader(file, burn_in_percentage)?;
        debug!(
            "trace log {:?}: {} columns, {} rows after burn-in",
            path.as_ref(),
            table.labels.len(),
            table.n_rows()
        );
        Ok(table)
    }

    /// Read a trace log from any reader. The header row names the columns;
    /// '#'-prefixed lines are comments. Tab-delimited logs go through the CSV
    /// reader; whitespace-delimited logs are split by hand.
    pub fn from_reader<R: Read>(mut reader: R, burn_in_percentage: u8) -> PpResult<Self> {
        if burn_in_percentage >= 100 {
            return Err(AdequacyError::InvalidConfiguration(format!(
                "burn-in percentage must be below 100, got {}",
                burn_in_percentage
            )));
        }
        let mut content = String::new();
        reader.read_to_string(&mut content)?;

        let mut lines = content
            .lines()
            .map(str::trim_end)
            .filter(|l| !l.is_empty() && !l.starts_with('#'));
        let header = lines
            .next()
            .ok_or_else(|| AdequacyError::Validation("empty trace log".into()))?;

        let (labels, rows) = if header.contains('\t') {
            Self::read_tab_delimited(&content)?
        } else {
            let labels: Vec<String> = header.split_whitespace().map(str::to_string).collect();
            let mut rows = Vec::new();
            for line in lines {
                rows.push(parse_row(line.split_whitespace(), labels.len(), line)?);
            }
            (labels, rows)
        };

        let mut index = HashMap::new();
        for (i, label) in labels.iter().enumerate() {
            if index.insert(label.clone(), i).is_some() {
                return Err(AdequacyError::Validation(format!(
                    "duplicate trace column '{}'",
                    label
                )));
            }
        }

        let skip = rows.len() * burn_in_percentage as usize / 100;
        let mut columns = vec![Vec::with_capacity(rows.len() - skip); labels.len()];
        for row in rows.into_iter().skip(skip) {
            for (col, value) in columns.iter_mut().zip(row) {
                col.push(value);
            }
        }
        Ok(Self {
            labels,
            columns,
            index,
        })
    }

    fn read_tab_delimited(content: &str) -> PpResult<(Vec<String>, Vec<Vec<f64>>)> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .comment(Some(b'#'))
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let labels: Vec<String> = rdr
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            if record.iter().all(|f| f.is_empty()) {
                continue;
            }
            let joined = record.iter().collect::<Vec<_>>().join("\t");
            rows.push(parse_row(record.iter(), labels.len(), &joined)?);
        }
        Ok((labels, rows))
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Number of retained posterior samples.
    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows() == 0
    }

    /// The column with exactly this label, if present.
    pub fn column(&self, label: &str) -> Option<&[f64]> {
        self.index.get(label).map(|&i| self.columns[i].as_slice())
    }
}

fn parse_row<'a, I: Iterator<Item = &'a str>>(
    fields: I,
    expected: usize,
    line: &str,
) -> PpResult<Vec<f64>> {
    let mut row = Vec::with_capacity(expected);
    for field in fields {
        let value = field.parse::<f64>().map_err(|_| {
            AdequacyError::Validation(format!(
                "non-numeric trace value '{}' in row '{}'",
                field, line
            ))
        })?;
        row.push(value);
    }
    if row.len() != expected {
        return Err(AdequacyError::Validation(format!(
            "trace row has {} fields, expected {}: '{}'",
            row.len(),
            expected,
            line
        )));
    }
    Ok(row)
}

/// The identifier truncated at its first '.' separator, when it has one.
///
/// `clockRate.c:dna` falls back to `clockRate`; an identifier without a
/// partition suffix has no fallback.
pub fn fallback_label(identifier: &str) -> Option<&str> {
    identifier.find('.').map(|i| &identifier[..i])
}

/// Resolve a scalar parameter's trace column: the identifier itself, else the
/// identifier truncated at its first '.'.
pub fn resolve_column<'a>(table: &'a TraceTable, identifier: &str) -> PpResult<&'a [f64]> {
    if let Some(col) = table.column(identifier) {
        return Ok(col);
    }
    if let Some(short) = fallback_label(identifier) {
        if let Some(col) = table.column(short) {
            return Ok(col);
        }
    }
    Err(AdequacyError::MissingTraceColumn(identifier.to_string()))
}

/// Resolve component `j` (1-based) of a vector parameter: `identifier{j}`,
/// else `truncated-identifier.{j}`.
pub fn resolve_component<'a>(
    table: &'a TraceTable,
    identifier: &str,
    j: usize,
) -> PpResult<&'a [f64]> {
    let direct = format!("{}{}", identifier, j);
    if let Some(col) = table.column(&direct) {
        return Ok(col);
    }
    if let Some(short) = fallback_label(identifier) {
        let dotted = format!("{}.{}", short, j);
        if let Some(col) = table.column(&dotted) {
            return Ok(col);
        }
    }
    Err(AdequacyError::MissingTraceColumn(direct))
}

/// Ordered stream of posterior tree samples with a read cursor.
#[derive(Debug, Clone)]
pub struct TreeLog {
    trees: Vec<Tree>,
    cursor: usize,
}

impl TreeLog {
    pub fn from_path<P: AsRef<Path>>(path: P, burn_in_percentage: u8) -> PpResult<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let log = Self::from_str(&content, burn_in_percentage)?;
        debug!(
            "tree log {:?}: {} trees after burn-in",
            path.as_ref(),
            log.remaining()
        );
        Ok(log)
    }

    pub fn from_str(content: &str, burn_in_percentage: u8) -> PpResult<Self> {
        if burn_in_percentage >= 100 {
            return Err(AdequacyError::InvalidConfiguration(format!(
                "burn-in percentage must be below 100, got {}",
                burn_in_percentage
            )));
        }
        let mut trees = parse_tree_log(content)?;
        let skip = trees.len() * burn_in_percentage as usize / 100;
        trees.drain(..skip);
        Ok(Self { trees, cursor: 0 })
    }

    pub fn from_trees(trees: Vec<Tree>) -> Self {
        Self { trees, cursor: 0 }
    }

    pub fn has_next(&self) -> bool {
        self.cursor < self.trees.len()
    }

    /// Trees not yet consumed by [`Self::next_tree`].
    pub fn remaining(&self) -> usize {
        self.trees.len() - self.cursor
    }

    pub fn next_tree(&mut self) -> Option<Tree> {
        let tree = self.trees.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(tree)
    }
}
