use crate::core::models::dust::{DustOpacity, DustTableError};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DustFileError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: expected 'wavelength kappa', found '{content}'")]
    Parse { line: usize, content: String },
    #[error("Invalid dust table: {0}")]
    Table(#[from] DustTableError),
}

/// Reads a two-column table of wavelength (micron) and opacity (cm^2 g^-1).
///
/// Blank lines and lines starting with `#` or `!` are ignored.
pub fn read_dust_table(reader: impl BufRead) -> Result<DustOpacity, DustFileError> {
    let mut entries = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
            continue;
        }
        let mut tokens = trimmed.split_whitespace().map(str::parse::<f64>);
        match (tokens.next(), tokens.next()) {
            (Some(Ok(wavelength)), Some(Ok(kappa))) => entries.push((wavelength, kappa)),
            _ => {
                return Err(DustFileError::Parse {
                    line: index + 1,
                    content: trimmed.to_string(),
                });
            }
        }
    }
    Ok(DustOpacity::from_table(&entries)?)
}

pub fn read_dust_table_from_path<P: AsRef<Path>>(path: P) -> Result<DustOpacity, DustFileError> {
    let file = File::open(path)?;
    read_dust_table(BufReader::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_table_skipping_comments() {
        let text = "# OH94 thin mantles\n100.0  100.0\n\n1000.0 1.0\n";
        let table = read_dust_table(Cursor::new(text)).unwrap();
        assert!(table.kappa(3e12) > table.kappa(3e11));
    }

    #[test]
    fn malformed_row_reports_line_number() {
        let text = "100.0 100.0\n1000.0\n";
        assert!(matches!(
            read_dust_table(Cursor::new(text)),
            Err(DustFileError::Parse { line: 2, .. })
        ));
    }
}
