//! Module: index::range
//! Responsibility: exclusive-bound emulation and scan-shape classification.
//! Does not own: bound-tuple encoding or backend traversal.
//! Boundary: the query executor turns plan bounds into an `IndexScan` here.

use crate::db::index::encode::IndexableString;
use thiserror::Error as ThisError;

///
/// QuantumError
///

#[derive(Clone, Copy, Debug, Eq, PartialEq, ThisError)]
pub enum QuantumError {
    #[error("indexable string is already the largest representable value")]
    Overflow,

    #[error("indexable string is already the smallest representable value")]
    Underflow,
}

///
/// QuantumDirection
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QuantumDirection {
    Up,
    Down,
}

/// Move `s` to the adjacent string of the same length, stepping its last
/// character and carrying (or borrowing) into earlier positions when that
/// character is already at the end of the Unicode scalar range.
///
/// `Up` then `Down` (and the reverse) is the identity for every string that
/// does not overflow or underflow.
pub fn change_by_one_quantum(
    s: &str,
    direction: QuantumDirection,
) -> Result<String, QuantumError> {
    let mut chars = s.chars().collect::<Vec<_>>();

    let (step, reset): (fn(char) -> Option<char>, char) = match direction {
        QuantumDirection::Up => (next_scalar, '\0'),
        QuantumDirection::Down => (prev_scalar, char::MAX),
    };

    for idx in (0..chars.len()).rev() {
        if let Some(stepped) = step(chars[idx]) {
            chars[idx] = stepped;
            for tail in &mut chars[idx + 1..] {
                *tail = reset;
            }

            return Ok(chars.into_iter().collect());
        }
    }

    Err(match direction {
        QuantumDirection::Up => QuantumError::Overflow,
        QuantumDirection::Down => QuantumError::Underflow,
    })
}

// Surrogates are not scalar values; the step jumps over them.
fn next_scalar(ch: char) -> Option<char> {
    match ch {
        char::MAX => None,
        '\u{D7FF}' => Some('\u{E000}'),
        _ => char::from_u32(u32::from(ch) + 1),
    }
}

fn prev_scalar(ch: char) -> Option<char> {
    match ch {
        '\0' => None,
        '\u{E000}' => Some('\u{D7FF}'),
        _ => char::from_u32(u32::from(ch) - 1),
    }
}

///
/// IndexScan
///
/// Concrete access shape for one index read. Ranges are half-open:
/// `start` inclusive, `end` exclusive, `None` meaning the end of the index.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum IndexScan {
    Empty,
    Point(IndexableString),
    Range {
        start: IndexableString,
        end: Option<IndexableString>,
    },
}

impl IndexScan {
    /// Classify encoded plan bounds.
    ///
    /// Equal bounds never become a range: a half-open `[k, k)` is empty on
    /// every backend, so an inclusive single key is served by a point lookup.
    #[must_use]
    pub fn from_bounds(
        lower: IndexableString,
        upper: IndexableString,
        inclusive_start: bool,
        inclusive_end: bool,
    ) -> Self {
        if lower == upper {
            return if inclusive_start && inclusive_end {
                Self::Point(lower)
            } else {
                Self::Empty
            };
        }
        if lower > upper {
            return Self::Empty;
        }

        let start = if inclusive_start {
            lower
        } else {
            match change_by_one_quantum(&lower, QuantumDirection::Up) {
                Ok(next) => IndexableString::new(next),
                Err(_) => return Self::Empty,
            }
        };

        let end = if inclusive_end {
            change_by_one_quantum(&upper, QuantumDirection::Up)
                .ok()
                .map(IndexableString::new)
        } else {
            Some(upper)
        };

        if end.as_ref().is_some_and(|end| start >= *end) {
            return Self::Empty;
        }

        Self::Range { start, end }
    }

    /// Open range covering the whole index.
    #[must_use]
    pub fn full() -> Self {
        Self::Range {
            start: IndexableString::new(String::new()),
            end: None,
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}
