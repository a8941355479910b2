//! Feature importance tables: one `Feature` key column plus numeric columns.

use crate::error::DataError;

/// Name of the key column.
pub const FEATURE_COLUMN: &str = "Feature";

/// One feature and its value in every numeric column.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub feature: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImportanceTable {
    columns: Vec<String>,
    rows: Vec<FeatureRow>,
}

impl ImportanceTable {
    /// Empty table with the given numeric columns.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Table with a single numeric column.
    pub fn single<I, K>(column: &str, values: I) -> Result<Self, DataError>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        let mut table = Self::new([column]);
        for (feature, value) in values {
            table.push(feature, vec![value])?;
        }
        Ok(table)
    }

    /// Append a row. Features are unique and rows match the column count.
    pub fn push(&mut self, feature: impl Into<String>, values: Vec<f64>) -> Result<(), DataError> {
        let feature = feature.into();
        if values.len() != self.columns.len() {
            return Err(DataError::RowWidth {
                feature,
                expected: self.columns.len(),
                found: values.len(),
            });
        }
        if self.row(&feature).is_some() {
            return Err(DataError::DuplicateFeature(feature));
        }
        self.rows.push(FeatureRow { feature, values });
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub(crate) fn rows_mut(&mut self) -> &mut Vec<FeatureRow> {
        &mut self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, feature: &str) -> Option<&FeatureRow> {
        self.rows.iter().find(|r| r.feature == feature)
    }

    pub fn column_index(&self, column: &str) -> Result<usize, DataError> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| DataError::MissingColumn {
                column: column.to_string(),
                source_name: "importance table".to_string(),
            })
    }

    /// `(feature, value)` pairs of one column, in row order.
    pub fn column(&self, column: &str) -> Result<Vec<(&str, f64)>, DataError> {
        let index = self.column_index(column)?;
        Ok(self
            .rows
            .iter()
            .map(|r| (r.feature.as_str(), r.values[index]))
            .collect())
    }

    pub fn value(&self, feature: &str, column: &str) -> Option<f64> {
        let index = self.column_index(column).ok()?;
        self.row(feature).map(|r| r.values[index])
    }

    /// Copy keeping only the features accepted by `keep`.
    pub fn filter(&self, keep: impl Fn(&str) -> bool) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|r| keep(&r.feature)).cloned().collect(),
        }
    }
}
