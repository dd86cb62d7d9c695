use serde::{Deserialize, Serialize};

/// A single spreadsheet cell as returned by the values API with
/// `UNFORMATTED_VALUE` rendering: checkboxes arrive as booleans, numbers as
/// numbers, everything else as text. Missing trailing cells are `Empty`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Empty,
    Bool(bool),
    Number(f64),
    Text(String),
}

pub type Row = Vec<CellValue>;
pub type Grid = Vec<Row>;

static EMPTY: CellValue = CellValue::Empty;

impl CellValue {
    pub fn text(s: impl Into<String>) -> Self {
        CellValue::Text(s.into())
    }

    /// Trimmed textual rendering. Whole numbers print without a fraction so
    /// `1.0` reads as `"1"`, the way the sheet displays it.
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Bool(true) => "TRUE".to_string(),
            CellValue::Bool(false) => "FALSE".to_string(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Text(s) => s.trim().to_string(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.as_text().is_empty()
    }

    /// Sheet truthiness for toggle cells: off when empty, `FALSE` in any case,
    /// or zero; on otherwise.
    pub fn is_truthy(&self) -> bool {
        match self {
            CellValue::Empty => false,
            CellValue::Bool(b) => *b,
            CellValue::Number(n) => *n != 0.0,
            CellValue::Text(s) => {
                let s = s.trim();
                !s.is_empty() && s != "0" && !s.eq_ignore_ascii_case("false")
            }
        }
    }

    pub fn is_formula(&self) -> bool {
        matches!(self, CellValue::Text(s) if s.starts_with('='))
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            CellValue::Number(n) if *n >= 0.0 => *n as u32,
            other => {
                let t = other.as_text();
                let digits: String = t.chars().take_while(|c| c.is_ascii_digit()).collect();
                digits.parse().unwrap_or(0)
            }
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Cell at `index`, or `Empty` when the row is short.
pub fn cell_at(row: &[CellValue], index: usize) -> &CellValue {
    row.get(index).unwrap_or(&EMPTY)
}

/// Row at `index` of a grid, or an empty slice.
pub fn row_at(grid: &[Row], index: usize) -> &[CellValue] {
    grid.get(index).map(Vec::as_slice).unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_matches_sheet_convention() {
        assert!(!CellValue::Empty.is_truthy());
        assert!(!CellValue::Bool(false).is_truthy());
        assert!(!CellValue::text("FALSE").is_truthy());
        assert!(!CellValue::text("false ").is_truthy());
        assert!(!CellValue::text("0").is_truthy());
        assert!(!CellValue::text("   ").is_truthy());
        assert!(!CellValue::Number(0.0).is_truthy());

        assert!(CellValue::Bool(true).is_truthy());
        assert!(CellValue::text("TRUE").is_truthy());
        assert!(CellValue::text("x").is_truthy());
        assert!(CellValue::Number(2.0).is_truthy());
    }

    #[test]
    fn deserializes_mixed_grid() {
        let grid: Grid = serde_json::from_str(r#"[["MR-001", 12.5, true, "", null]]"#).unwrap();
        assert_eq!(grid[0][0], CellValue::text("MR-001"));
        assert_eq!(grid[0][1], CellValue::Number(12.5));
        assert_eq!(grid[0][2], CellValue::Bool(true));
        assert!(grid[0][3].is_blank());
        assert_eq!(grid[0][4], CellValue::Empty);
    }

    #[test]
    fn text_rendering() {
        assert_eq!(CellValue::Number(3.0).as_text(), "3");
        assert_eq!(CellValue::Number(3.25).as_text(), "3.25");
        assert_eq!(CellValue::text("  1ST FLOOR ").as_text(), "1ST FLOOR");
        assert_eq!(CellValue::text("4 items").as_u32(), 4);
        assert_eq!(CellValue::Number(7.0).as_u32(), 7);
    }

    #[test]
    fn short_rows_read_as_empty() {
        let row = vec![CellValue::text("a")];
        assert_eq!(cell_at(&row, 5), &CellValue::Empty);
        assert!(row_at(&[], 3).is_empty());
    }
}
