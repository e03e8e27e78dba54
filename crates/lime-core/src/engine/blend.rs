use crate::core::constants::CLIGHT;
use crate::core::models::molecule::MolecularData;
use tracing::debug;

/// A line overlapping the line it is attached to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Blend {
    pub species: usize,
    pub line: usize,
    /// Velocity (m/s) of the partner's line centre in the frame of the owning line;
    /// the partner profile is evaluated at `deltav - velocity_offset`.
    pub velocity_offset: f64,
}

/// Lines whose velocity separation is below the blend threshold, indexed by
/// `[species][line]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlendSet {
    partners: Vec<Vec<Vec<Blend>>>,
    pairs: usize,
}

impl BlendSet {
    /// A set with no blends, shaped for `molecules`.
    pub fn none(molecules: &[MolecularData]) -> Self {
        Self {
            partners: molecules.iter().map(|m| vec![Vec::new(); m.line_count()]).collect(),
            pairs: 0,
        }
    }

    /// Pairs every two lines, across all species, closer than `threshold` (m/s).
    ///
    /// Each unordered pair is examined once and recorded on both lines.
    pub fn detect(molecules: &[MolecularData], threshold: f64) -> Self {
        let mut set = Self::none(molecules);
        let lines: Vec<(usize, usize, f64)> = molecules
            .iter()
            .enumerate()
            .flat_map(|(s, m)| m.lines().iter().enumerate().map(move |(l, t)| (s, l, t.frequency)))
            .collect();

        for (a, &(sa, la, fa)) in lines.iter().enumerate() {
            for &(sb, lb, fb) in &lines[a + 1..] {
                if (CLIGHT * (fa - fb) / fa).abs() >= threshold {
                    continue;
                }
                set.partners[sa][la].push(Blend {
                    species: sb,
                    line: lb,
                    velocity_offset: CLIGHT * (fa - fb) / fa,
                });
                set.partners[sb][lb].push(Blend {
                    species: sa,
                    line: la,
                    velocity_offset: CLIGHT * (fb - fa) / fb,
                });
                set.pairs += 1;
                debug!(
                    first = %molecules[sa].name(),
                    first_line = la,
                    second = %molecules[sb].name(),
                    second_line = lb,
                    "Lines blended"
                );
            }
        }
        set
    }

    pub fn partners(&self, species: usize, line: usize) -> &[Blend] {
        self.partners
            .get(species)
            .and_then(|lines| lines.get(line))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of blended line pairs.
    pub fn pair_count(&self) -> usize {
        self.pairs
    }

    pub fn is_empty(&self) -> bool {
        self.pairs == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::molecule::Level;

    fn species(name: &str, frequencies: &[f64]) -> MolecularData {
        let levels: Vec<Level> = (0..=frequencies.len())
            .map(|i| Level {
                energy: i as f64,
                weight: 1.0,
            })
            .collect();
        let lines: Vec<_> = frequencies
            .iter()
            .enumerate()
            .map(|(i, &f)| (i + 1, i, 1e-5, f))
            .collect();
        MolecularData::new(name, 28.0, levels, &lines, vec![]).unwrap()
    }

    #[test]
    fn close_lines_across_species_are_paired_symmetrically() {
        // 1 km/s apart at 100 GHz.
        let a = species("A", &[100e9, 200e9]);
        let b = species("B", &[100e9 * (1.0 - 1e3 / CLIGHT)]);
        let set = BlendSet::detect(&[a, b], 1e4);
        assert_eq!(set.pair_count(), 1);
        let forward = set.partners(0, 0)[0];
        assert_eq!((forward.species, forward.line), (1, 0));
        assert!((forward.velocity_offset - 1e3).abs() < 1e-6);
        let backward = set.partners(1, 0)[0];
        assert!((backward.velocity_offset + 1e3).abs() < 1e-2);
        assert!(set.partners(0, 1).is_empty());
    }

    #[test]
    fn distant_lines_are_not_blended() {
        let a = species("A", &[100e9, 101e9]);
        let set = BlendSet::detect(&[a], 1e4);
        assert!(set.is_empty());
        assert!(set.partners(5, 5).is_empty());
    }
}
