//! Spatial cell keys.
//!
//! A position is reduced to a geohash prefix of fixed length. Every position
//! inside the same geohash cell produces the same key, so the key length
//! decides how large an area one cached payload covers:
//!
//! | precision | cell size (approx.) |
//! |-----------|---------------------|
//! | 3         | 156 km x 156 km     |
//! | 4         | 39 km x 19.5 km     |
//! | 5         | 4.9 km x 4.9 km     |
//! | 6         | 1.2 km x 0.6 km     |

use serde::{Deserialize, Serialize};
use std::fmt;

use weather_common::Position;

const BASE32: &[u8] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Shortest accepted geohash length.
pub const MIN_PRECISION: usize = 1;
/// Longest accepted geohash length.
pub const MAX_PRECISION: usize = 12;
/// Default cell precision (~4.9 km cells).
pub const DEFAULT_PRECISION: usize = 5;

/// Geohash key identifying one cache cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellKey(String);

impl CellKey {
    /// Derive the key of the cell containing `position`.
    ///
    /// `precision` is clamped to `MIN_PRECISION..=MAX_PRECISION`.
    pub fn derive(position: &Position, precision: usize) -> Self {
        let precision = precision.clamp(MIN_PRECISION, MAX_PRECISION);
        let mut geohash = String::with_capacity(precision);
        let mut lat_range = (-90.0, 90.0);
        let mut lon_range = (-180.0, 180.0);
        let mut is_even = true;
        let mut bit = 0;
        let mut ch = 0usize;

        while geohash.len() < precision {
            if is_even {
                let mid = (lon_range.0 + lon_range.1) / 2.0;
                if position.longitude > mid {
                    ch |= 1 << (4 - bit);
                    lon_range.0 = mid;
                } else {
                    lon_range.1 = mid;
                }
            } else {
                let mid = (lat_range.0 + lat_range.1) / 2.0;
                if position.latitude > mid {
                    ch |= 1 << (4 - bit);
                    lat_range.0 = mid;
                } else {
                    lat_range.1 = mid;
                }
            }

            is_even = !is_even;

            if bit < 4 {
                bit += 1;
            } else {
                geohash.push(BASE32[ch] as char);
                bit = 0;
                ch = 0;
            }
        }

        CellKey(geohash)
    }

    /// Parse a stored key, rejecting anything that is not valid geohash text.
    pub fn parse(s: &str) -> Option<Self> {
        let valid = (MIN_PRECISION..=MAX_PRECISION).contains(&s.len())
            && s.bytes().all(|b| BASE32.contains(&b));
        valid.then(|| CellKey(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn precision(&self) -> usize {
        self.0.len()
    }

    /// Latitude/longitude bounds of this cell.
    pub fn bounds(&self) -> CellBounds {
        let mut lat_range = (-90.0, 90.0);
        let mut lon_range = (-180.0, 180.0);
        let mut is_even = true;

        for b in self.0.bytes() {
            let idx = BASE32.iter().position(|&c| c == b).unwrap_or(0);
            for shift in (0..5).rev() {
                let set = (idx >> shift) & 1 == 1;
                let range = if is_even {
                    &mut lon_range
                } else {
                    &mut lat_range
                };
                let mid = (range.0 + range.1) / 2.0;
                if set {
                    range.0 = mid;
                } else {
                    range.1 = mid;
                }
                is_even = !is_even;
            }
        }

        CellBounds {
            min_lat: lat_range.0,
            max_lat: lat_range.1,
            min_lon: lon_range.0,
            max_lon: lon_range.1,
        }
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Geographic extent of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CellBounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl CellBounds {
    pub fn center(&self) -> Position {
        Position::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }
}
