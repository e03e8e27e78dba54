use crate::core::constants::{CLIGHT, HCKB};
use crate::core::models::molecule::{
    CollisionPartner, CollisionTable, CollisionalTransition, Level, MolecularData, MoleculeError,
};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum LamdaError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {kind}")]
    Parse { line: usize, kind: LamdaParseErrorKind },
    #[error("Unexpected end of file while reading {0}")]
    UnexpectedEof(&'static str),
    #[error("Invalid molecular data: {0}")]
    Invalid(#[from] MoleculeError),
}

#[derive(Debug, Error)]
pub enum LamdaParseErrorKind {
    #[error("Invalid integer for {field} (value: '{value}')")]
    InvalidInt { field: &'static str, value: String },
    #[error("Invalid float for {field} (value: '{value}')")]
    InvalidFloat { field: &'static str, value: String },
    #[error("Expected {expected} values for {field}, found {found}")]
    MissingValues {
        field: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("Unknown collision partner id {0}")]
    UnknownPartner(u32),
}

/// Data lines of a LAMDA file with `!` comment lines removed.
struct Cursor {
    lines: Vec<(usize, String)>,
    position: usize,
}

impl Cursor {
    fn new(reader: impl BufRead) -> Result<Self, LamdaError> {
        let mut lines = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('!') {
                continue;
            }
            lines.push((index + 1, trimmed.to_string()));
        }
        Ok(Self { lines, position: 0 })
    }

    fn next_line(&mut self, what: &'static str) -> Result<(usize, &str), LamdaError> {
        let (number, line) = self
            .lines
            .get(self.position)
            .ok_or(LamdaError::UnexpectedEof(what))?;
        self.position += 1;
        Ok((*number, line.as_str()))
    }

    fn next_usize(&mut self, field: &'static str) -> Result<usize, LamdaError> {
        let (line, text) = self.next_line(field)?;
        let token = text.split_whitespace().next().unwrap_or("");
        parse_int(token, line, field)
    }

    fn next_f64(&mut self, field: &'static str) -> Result<f64, LamdaError> {
        let (line, text) = self.next_line(field)?;
        let token = text.split_whitespace().next().unwrap_or("");
        parse_float(token, line, field)
    }

    /// Reads `count` floats, continuing onto following lines when one line holds fewer.
    fn next_floats(&mut self, count: usize, field: &'static str) -> Result<Vec<f64>, LamdaError> {
        let mut values = Vec::with_capacity(count);
        while values.len() < count {
            let (line, text) = self.next_line(field)?;
            for token in text.split_whitespace() {
                if values.len() == count {
                    break;
                }
                values.push(parse_float(token, line, field)?);
            }
        }
        Ok(values)
    }
}

fn parse_int(token: &str, line: usize, field: &'static str) -> Result<usize, LamdaError> {
    token.parse().map_err(|_| LamdaError::Parse {
        line,
        kind: LamdaParseErrorKind::InvalidInt {
            field,
            value: token.to_string(),
        },
    })
}

fn parse_float(token: &str, line: usize, field: &'static str) -> Result<f64, LamdaError> {
    // Some LAMDA files use Fortran double-precision exponents.
    token.replace(['d', 'D'], "e").parse().map_err(|_| LamdaError::Parse {
        line,
        kind: LamdaParseErrorKind::InvalidFloat {
            field,
            value: token.to_string(),
        },
    })
}

fn columns<'a>(
    text: &'a str,
    line: usize,
    expected: usize,
    field: &'static str,
) -> Result<Vec<&'a str>, LamdaError> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() < expected {
        return Err(LamdaError::Parse {
            line,
            kind: LamdaParseErrorKind::MissingValues {
                field,
                expected,
                found: tokens.len(),
            },
        });
    }
    Ok(tokens)
}

pub struct LamdaFile;

impl LamdaFile {
    /// Parses a molecular data file in the LAMDA format.
    ///
    /// Frequencies are converted from GHz to Hz and collision rates from cm^3 s^-1 to
    /// m^3 s^-1. Level indices are converted to zero-based.
    ///
    /// # Errors
    ///
    /// Returns [`LamdaError`] for malformed numbers, truncated files, unknown collision
    /// partners and tables that fail [`MolecularData`] validation.
    pub fn read_from(reader: impl BufRead) -> Result<MolecularData, LamdaError> {
        let mut cursor = Cursor::new(reader)?;

        let name = cursor.next_line("molecule name")?.1.to_string();
        let molecular_weight = cursor.next_f64("molecular weight")?;

        let level_count = cursor.next_usize("number of energy levels")?;
        let mut levels = Vec::with_capacity(level_count);
        for _ in 0..level_count {
            let (line, text) = cursor.next_line("energy levels")?;
            let tokens = columns(text, line, 3, "energy level")?;
            levels.push(Level {
                energy: parse_float(tokens[1], line, "level energy")?,
                weight: parse_float(tokens[2], line, "level weight")?,
            });
        }

        let line_count = cursor.next_usize("number of radiative transitions")?;
        let mut lines = Vec::with_capacity(line_count);
        for _ in 0..line_count {
            let (line, text) = cursor.next_line("radiative transitions")?;
            let tokens = columns(text, line, 5, "radiative transition")?;
            let upper = parse_int(tokens[1], line, "upper level")?;
            let lower = parse_int(tokens[2], line, "lower level")?;
            let einstein_a = parse_float(tokens[3], line, "Einstein A")?;
            let mut frequency = parse_float(tokens[4], line, "frequency")? * 1e9;
            let in_range = |level: usize| level >= 1 && level <= levels.len();
            if frequency <= 0.0 && in_range(upper) && in_range(lower) {
                frequency = (levels[upper - 1].energy - levels[lower - 1].energy) * 100.0 * CLIGHT;
                warn!(
                    line,
                    "Line frequency missing, derived {:.6e} Hz from level energies", frequency
                );
            }
            lines.push((upper.saturating_sub(1), lower.saturating_sub(1), einstein_a, frequency));
        }

        let partner_count = cursor.next_usize("number of collision partners")?;
        let mut collisions = Vec::with_capacity(partner_count);
        for _ in 0..partner_count {
            let (line, text) = cursor.next_line("collision partner")?;
            let token = text.split_whitespace().next().unwrap_or("");
            let id = parse_int(token, line, "collision partner id")? as u32;
            let partner = CollisionPartner::from_lamda_id(id).ok_or(LamdaError::Parse {
                line,
                kind: LamdaParseErrorKind::UnknownPartner(id),
            })?;

            let transition_count = cursor.next_usize("number of collisional transitions")?;
            let temperature_count = cursor.next_usize("number of collision temperatures")?;
            let temperatures = cursor.next_floats(temperature_count, "collision temperatures")?;

            let mut transitions = Vec::with_capacity(transition_count);
            for _ in 0..transition_count {
                let (line, text) = cursor.next_line("collisional transitions")?;
                let tokens = columns(text, line, 3 + temperature_count, "collisional transition")?;
                let upper = parse_int(tokens[1], line, "upper level")?;
                let lower = parse_int(tokens[2], line, "lower level")?;
                let rates = tokens[3..3 + temperature_count]
                    .iter()
                    .map(|t| parse_float(t, line, "collision rate").map(|r| r * 1e-6))
                    .collect::<Result<Vec<_>, _>>()?;
                transitions.push(CollisionalTransition {
                    upper: upper.saturating_sub(1),
                    lower: lower.saturating_sub(1),
                    rates,
                });
            }
            debug!(
                partner = %partner,
                transitions = transitions.len(),
                temperatures = temperatures.len(),
                "Read collision table"
            );
            collisions.push(CollisionTable {
                partner,
                temperatures,
                transitions,
            });
        }

        let molecule = MolecularData::new(name, molecular_weight, levels, &lines, collisions)?;
        debug!(
            molecule = molecule.name(),
            levels = molecule.level_count(),
            lines = molecule.line_count(),
            upper_energy_k = molecule.levels().last().map(|l| l.energy * HCKB).unwrap_or(0.0),
            "Parsed LAMDA file"
        );
        Ok(molecule)
    }

    pub fn read_from_path<P: AsRef<Path>>(path: P) -> Result<MolecularData, LamdaError> {
        let file = File::open(path)?;
        Self::read_from(BufReader::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    const TOY_CO: &str = "\
!MOLECULE
CO
!MOLECULAR WEIGHT
28.0
!NUMBER OF ENERGY LEVELS
3
!LEVEL + ENERGIES(cm^-1) + WEIGHT + J
    1     0.000000000  1.0     0
    2     3.845033413  3.0     1
    3    11.534919938  5.0     2
!NUMBER OF RADIATIVE TRANSITIONS
2
!TRANS + UP + LOW + EINSTEINA(s^-1) + FREQ(GHz) + E_u(K)
    1     2     1  7.203e-08     115.2712018     5.53
    2     3     2  6.910e-07     230.5380000    16.60
!NUMBER OF COLL PARTNERS
1
!COLLISIONS BETWEEN
2 CO-pH2 from Yang et al. (2010)
!NUMBER OF COLL TRANS
3
!NUMBER OF COLL TEMPS
3
!COLL TEMPS
    10.0 20.0
    30.0
!TRANS + UP + LOW + COLLRATES(cm^3 s^-1)
    1     2     1  3.3e-11 3.4e-11 3.5e-11
    2     3     1  2.9e-11 3.0D-11 3.1e-11
    3     3     2  6.0e-11 6.2e-11 6.4e-11
";

    #[test]
    fn parses_levels_lines_and_collisions_with_unit_conversion() {
        let mol = LamdaFile::read_from(IoCursor::new(TOY_CO)).unwrap();
        assert_eq!(mol.name(), "CO");
        assert_eq!(mol.level_count(), 3);
        assert_eq!(mol.line_count(), 2);
        let line = mol.lines()[0];
        assert_eq!((line.upper, line.lower), (1, 0));
        assert!((line.frequency - 115.2712018e9).abs() < 1.0);

        let table = mol.collision_table(CollisionPartner::ParaH2).unwrap();
        assert_eq!(table.temperatures, vec![10.0, 20.0, 30.0]);
        assert_eq!(table.transitions.len(), 3);
        assert!((table.transitions[1].rates[1] - 3.0e-17).abs() < 1e-25);
    }

    #[test]
    fn truncated_file_reports_missing_section() {
        let truncated: String = TOY_CO.lines().take(12).collect::<Vec<_>>().join("\n");
        let err = LamdaFile::read_from(IoCursor::new(truncated)).unwrap_err();
        assert!(matches!(err, LamdaError::UnexpectedEof(_)), "{err}");
    }

    #[test]
    fn bad_number_reports_line() {
        let broken = TOY_CO.replace("7.203e-08", "seven");
        match LamdaFile::read_from(IoCursor::new(broken)) {
            Err(LamdaError::Parse { line, .. }) => assert_eq!(line, 14),
            other => panic!("unexpected result: {:?}", other.map(|m| m.name().to_string())),
        }
    }

    #[test]
    fn unknown_partner_is_rejected() {
        let broken = TOY_CO.replace("2 CO-pH2", "9 CO-X");
        assert!(matches!(
            LamdaFile::read_from(IoCursor::new(broken)),
            Err(LamdaError::Parse {
                kind: LamdaParseErrorKind::UnknownPartner(9),
                ..
            })
        ));
    }
}
