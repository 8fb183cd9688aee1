//! Data extent inspection for nested_fit data files.
//!
//! Data files have no header row. The column layout is described by the
//! `specstr` of the configuration: comma-separated tokens such as `x,c,ce`,
//! where `x` is the independent variable and `c` the counts.

use std::fs::File;
use std::path::Path;

use crate::error::{NestfitError, Result};

/// Field delimiter of a data file, inferred from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Comma,
    Tab,
}

impl Delimiter {
    /// `.csv` -> comma, `.tsv` -> tab. Only the last extension counts.
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("csv") => Ok(Delimiter::Comma),
            Some("tsv") => Ok(Delimiter::Tab),
            _ => Err(NestfitError::UnsupportedExtension(path.to_path_buf())),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Delimiter::Comma => b',',
            Delimiter::Tab => b'\t',
        }
    }
}

/// Index of `column` in the layout specifier.
pub fn column_index(specstr: &str, column: &str) -> Result<usize> {
    specstr
        .split(',')
        .position(|token| token.trim() == column)
        .ok_or_else(|| NestfitError::MissingColumn {
            specstr: specstr.to_string(),
            column: column.to_string(),
        })
}

/// Read the given columns of a data file as floats, one vector per column.
pub fn read_columns(path: &Path, columns: &[usize]) -> Result<Vec<Vec<f64>>> {
    let delimiter = Delimiter::from_path(path)?;
    let file = File::open(path)?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter.as_byte())
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut out = vec![Vec::new(); columns.len()];
    for (idx, result) in reader.records().enumerate() {
        let row = idx + 1;
        let record = result?;
        if record.iter().all(str::is_empty) {
            continue;
        }

        for (slot, &col) in columns.iter().enumerate() {
            let cell = record.get(col).ok_or_else(|| NestfitError::InvalidValue {
                path: path.to_path_buf(),
                row,
                message: format!("missing column {col}"),
            })?;
            let value = cell.parse::<f64>().map_err(|e| NestfitError::InvalidValue {
                path: path.to_path_buf(),
                row,
                message: format!("'{cell}': {e}"),
            })?;
            out[slot].push(value);
        }
    }

    if out.first().map_or(true, Vec::is_empty) {
        return Err(NestfitError::EmptyData(path.to_path_buf()));
    }
    Ok(out)
}

/// `(min, max)` of the `x` column of a data file.
pub fn compute_extents(path: &Path, specstr: &str) -> Result<(f64, f64)> {
    let x_col = column_index(specstr, "x")?;
    let mut columns = read_columns(path, &[x_col])?;
    let xs = columns.swap_remove(0);

    let (min, max) = xs.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
        (lo.min(x), hi.max(x))
    });
    Ok((min, max))
}

/// The `x` and `c` columns of a data file.
pub fn read_xy(path: &Path, specstr: &str) -> Result<(Vec<f64>, Vec<f64>)> {
    let x_col = column_index(specstr, "x")?;
    let c_col = column_index(specstr, "c")?;
    let mut columns = read_columns(path, &[x_col, c_col])?;
    let cs = columns.pop().unwrap_or_default();
    let xs = columns.pop().unwrap_or_default();
    Ok((xs, cs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(tmp: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = tmp.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_extents_of_x_column() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "data.csv", "1,10\n5,20\n3,15\n");
        assert_eq!(compute_extents(&path, "x,c").unwrap(), (1.0, 5.0));
    }

    #[test]
    fn test_x_column_position_follows_specstr() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "data.tsv", "10\t-2.5\n20\t7\n15\t0.5\n");
        assert_eq!(compute_extents(&path, "c,x").unwrap(), (-2.5, 7.0));
    }

    #[test]
    fn test_unsupported_extension() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "data.dat", "1 10\n");
        let err = compute_extents(&path, "x,c").unwrap_err();
        assert!(matches!(err, NestfitError::UnsupportedExtension(_)));

        let bare = write(&tmp, "data", "1,10\n");
        assert!(matches!(
            Delimiter::from_path(&bare),
            Err(NestfitError::UnsupportedExtension(_))
        ));
    }

    #[test]
    fn test_only_last_extension_counts() {
        assert_eq!(
            Delimiter::from_path(Path::new("run.tsv.csv")).unwrap(),
            Delimiter::Comma
        );
    }

    #[test]
    fn test_missing_x_column() {
        let err = column_index("c,ce", "x").unwrap_err();
        assert!(matches!(err, NestfitError::MissingColumn { .. }));
    }

    #[test]
    fn test_bad_cell_names_row() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "data.csv", "1,10\nabc,20\n");
        let err = compute_extents(&path, "x,c").unwrap_err();
        match err {
            NestfitError::InvalidValue { row, .. } => assert_eq!(row, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_file() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "data.csv", "");
        assert!(matches!(
            compute_extents(&path, "x,c"),
            Err(NestfitError::EmptyData(_))
        ));
    }

    #[test]
    fn test_read_xy() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "data.csv", "1,10,0.1\n2,20,0.2\n");
        let (xs, cs) = read_xy(&path, "x,c,ce").unwrap();
        assert_eq!(xs, vec![1.0, 2.0]);
        assert_eq!(cs, vec![10.0, 20.0]);
    }
}
