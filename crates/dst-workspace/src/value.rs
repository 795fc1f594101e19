//! Workspace values
//!
//! A value is a scalar, a 2-D array of values, or the shape placeholder a
//! decomposed parent carries once its cells live in child variables.

use crate::error::DecompositionError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Workspace value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Double precision number
    Number(f64),
    /// Character data
    Text(String),
    /// Logical
    Boolean(bool),
    /// Row-major 2-D array
    Array(ArrayValue),
    /// Stand-in left on a decomposed parent
    Placeholder {
        rows: usize,
        cols: usize,
        element_type: String,
    },
}

impl Value {
    /// Convert a repository string into a value
    ///
    /// Numbers and boolean literals are typed, anything else stays text.
    #[must_use]
    pub fn parse_repository_value(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(number) = trimmed.parse::<f64>() {
            return Value::Number(number);
        }
        match trimmed {
            "true" | "True" | "TRUE" => Value::Boolean(true),
            "false" | "False" | "FALSE" => Value::Boolean(false),
            _ => Value::Text(trimmed.to_string()),
        }
    }

    /// Placeholder describing an array's shape
    #[must_use]
    pub fn placeholder_for(array: &ArrayValue) -> Self {
        Value::Placeholder {
            rows: array.rows(),
            cols: array.cols(),
            element_type: array.element_type().to_string(),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    #[inline]
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Value::Placeholder { .. })
    }

    #[inline]
    #[must_use]
    pub fn as_array(&self) -> Option<&ArrayValue> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Engine class name of a scalar, `cell` for arrays
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "double",
            Value::Text(_) => "char",
            Value::Boolean(_) => "logical",
            Value::Array(_) | Value::Placeholder { .. } => "cell",
        }
    }

    /// String form written into repository value sets
    #[must_use]
    pub fn to_repository_value(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Array(a) => write!(f, "[{}x{}] matrix of {}", a.rows(), a.cols(), a.element_type()),
            Value::Placeholder {
                rows,
                cols,
                element_type,
            } => write!(f, "[{rows}x{cols}] matrix of {element_type}"),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

/// Row-major 2-D array
///
/// # Invariants
/// - `cells.len() == rows * cols`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    rows: usize,
    cols: usize,
    cells: Vec<Value>,
}

impl ArrayValue {
    /// Create array from row-major cells
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if the cell count differs from `rows * cols`
    pub fn new(rows: usize, cols: usize, cells: Vec<Value>) -> Result<Self, DecompositionError> {
        let expected = rows * cols;
        if cells.len() != expected {
            return Err(DecompositionError::ShapeMismatch {
                rows,
                cols,
                expected,
                actual: cells.len(),
            });
        }
        Ok(Self { rows, cols, cells })
    }

    /// Create array from rows
    ///
    /// # Errors
    /// Returns `RaggedRows` if rows have different lengths
    pub fn from_rows(rows: Vec<Vec<Value>>) -> Result<Self, DecompositionError> {
        let cols = rows.first().map_or(0, Vec::len);
        let row_count = rows.len();
        let mut cells = Vec::with_capacity(row_count * cols);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != cols {
                return Err(DecompositionError::RaggedRows {
                    row: i,
                    expected: cols,
                    actual: row.len(),
                });
            }
            cells.extend(row);
        }
        Ok(Self {
            rows: row_count,
            cols,
            cells,
        })
    }

    /// Create numeric array from rows of numbers
    ///
    /// # Errors
    /// Returns `RaggedRows` if rows have different lengths
    pub fn from_numbers(rows: &[Vec<f64>]) -> Result<Self, DecompositionError> {
        Self::from_rows(
            rows.iter()
                .map(|r| r.iter().copied().map(Value::Number).collect())
                .collect(),
        )
    }

    /// Empty array with a fixed extent on one axis
    #[inline]
    #[must_use]
    pub fn empty(rows: usize, cols: usize) -> Self {
        debug_assert!(rows == 0 || cols == 0);
        Self {
            rows,
            cols,
            cells: Vec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// (rows, cols)
    #[inline]
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Total cell count
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cell at (row, col)
    #[inline]
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<&Value> {
        if row < self.rows && col < self.cols {
            self.cells.get(row * self.cols + col)
        } else {
            None
        }
    }

    /// Cells in row-major order with their indices
    pub fn iter_cells(&self) -> impl Iterator<Item = (usize, usize, &Value)> {
        let cols = self.cols.max(1);
        self.cells
            .iter()
            .enumerate()
            .map(move |(k, v)| (k / cols, k % cols, v))
    }

    /// Row-major cells
    #[inline]
    #[must_use]
    pub fn cells(&self) -> &[Value] {
        &self.cells
    }

    /// Row `i` as a slice
    #[must_use]
    pub fn row(&self, i: usize) -> Option<&[Value]> {
        if i < self.rows {
            Some(&self.cells[i * self.cols..(i + 1) * self.cols])
        } else {
            None
        }
    }

    /// Engine class shared by all cells, `cell` when mixed or nested
    #[must_use]
    pub fn element_type(&self) -> &'static str {
        let mut names = self.cells.iter().map(Value::type_name);
        match names.next() {
            None => "double",
            Some(first) if names.all(|n| n == first) => first,
            Some(_) => "cell",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_shape_is_enforced() {
        let err = ArrayValue::new(2, 2, vec![Value::Number(1.0)]).unwrap_err();
        assert!(matches!(err, DecompositionError::ShapeMismatch { expected: 4, actual: 1, .. }));

        let ragged = ArrayValue::from_rows(vec![vec![1.0.into()], vec![1.0.into(), 2.0.into()]]);
        assert!(matches!(ragged, Err(DecompositionError::RaggedRows { row: 1, .. })));
    }

    #[test]
    fn iter_cells_is_row_major() {
        let array = ArrayValue::from_numbers(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        let order: Vec<(usize, usize)> = array.iter_cells().map(|(i, j, _)| (i, j)).collect();
        assert_eq!(order, vec![(0, 0), (0, 1), (0, 2), (1, 0), (1, 1), (1, 2)]);
        assert_eq!(array.get(1, 0), Some(&Value::Number(4.0)));
        assert_eq!(array.get(2, 0), None);
    }

    #[test]
    fn placeholder_text_describes_shape() {
        let array = ArrayValue::from_numbers(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        assert_eq!(Value::placeholder_for(&array).to_string(), "[2x3] matrix of double");

        let mixed = ArrayValue::from_rows(vec![vec![1.0.into(), "a".into()]]).unwrap();
        assert_eq!(mixed.element_type(), "cell");
    }

    #[test]
    fn repository_values_parse_to_typed_scalars() {
        assert_eq!(Value::parse_repository_value(" 2.5 "), Value::Number(2.5));
        assert_eq!(Value::parse_repository_value("true"), Value::Boolean(true));
        assert_eq!(Value::parse_repository_value("-"), Value::Text("-".into()));
        assert_eq!(Value::Number(3.0).to_repository_value(), "3");
    }
}
