//! Canonical, regeneration-stable identifiers.
//!
//! Every generated document gets an id derived only from its division, scope and
//! coordinate, so a repeated generation overwrites instead of duplicating.

use super::models::{BracketType, DivisionKey, MatchId, ParticipantId};

/// Where a document lives inside a division
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdScope {
    Pool { pool_key: String },
    Bracket(BracketType),
    Seed(BracketType),
}

/// Position of a document inside its scope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Coordinate {
    /// Unordered pool pairing; construct with [`Coordinate::pairing`]
    Pairing {
        first: ParticipantId,
        second: ParticipantId,
    },
    Position {
        round: u32,
        position: u32,
    },
    Bronze,
    Document,
}

impl Coordinate {
    /// Pairing coordinate independent of argument order
    pub fn pairing(a: &str, b: &str) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Coordinate::Pairing {
            first: first.to_string(),
            second: second.to_string(),
        }
    }
}

/// Derives canonical ids; swap implementations to honor a backend's key rules
pub trait IdStrategy: Send + Sync {
    fn canonical_id(&self, division: &DivisionKey, scope: &IdScope, coordinate: &Coordinate)
    -> MatchId;
}

/// `{division}_{scope}_{coordinate}` with each free-text component escaped
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultIdStrategy;

impl IdStrategy for DefaultIdStrategy {
    fn canonical_id(
        &self,
        division: &DivisionKey,
        scope: &IdScope,
        coordinate: &Coordinate,
    ) -> MatchId {
        let scope_part = match scope {
            IdScope::Pool { pool_key } => format!("pool-{}", sanitize(pool_key)),
            IdScope::Bracket(bracket_type) => bracket_type.as_str().to_string(),
            IdScope::Seed(bracket_type) => format!("seed-{}", bracket_type.as_str()),
        };

        let coordinate_part = match coordinate {
            Coordinate::Pairing { first, second } => {
                format!("{}-vs-{}", sanitize(first), sanitize(second))
            }
            Coordinate::Position { round, position } => format!("r{round}m{position}"),
            Coordinate::Bronze => "bronze".to_string(),
            Coordinate::Document => "doc".to_string(),
        };

        format!(
            "{}_{}_{}",
            sanitize(&division.division_id),
            scope_part,
            coordinate_part
        )
    }
}

/// Reversible component encoding: ASCII alphanumerics pass through, every
/// other byte becomes `~XX`. Separators (`_`, `-`) never survive inside a
/// component, so distinct inputs cannot collide.
fn sanitize(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("~{byte:02X}"));
        }
    }
    out
}
