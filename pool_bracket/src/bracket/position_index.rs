//! Temporary-id to canonical-id translation for bracket generation.
//!
//! Links between bracket matches are computed before canonical ids are
//! attached, so the generator works in [`TempId`]s. The index is built once per
//! bracket and answers both lookups in O(1).

use std::collections::HashMap;

use super::errors::{BracketError, BracketResult};
use crate::division::{BracketType, Coordinate, DivisionKey, IdScope, IdStrategy, MatchId};

/// Ephemeral id handed out while the tree is being laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TempId(pub u32);

/// Structural position of a bracket match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BracketPosition {
    /// 1-based round and 1-based position inside it
    Slot { round: u32, position: u32 },
    Bronze,
}

impl BracketPosition {
    fn coordinate(&self) -> Coordinate {
        match *self {
            BracketPosition::Slot { round, position } => Coordinate::Position { round, position },
            BracketPosition::Bronze => Coordinate::Bronze,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PositionIndex {
    temp_to_position: HashMap<TempId, BracketPosition>,
    position_to_temp: HashMap<BracketPosition, TempId>,
    position_to_canonical: HashMap<BracketPosition, MatchId>,
}

impl PositionIndex {
    /// Lay out every position of a `bracket_size` bracket (plus bronze) and
    /// derive its canonical id.
    ///
    /// Temp ids are assigned round by round, position by position, starting at 1.
    pub fn build(
        ids: &dyn IdStrategy,
        division: &DivisionKey,
        bracket_type: BracketType,
        bracket_size: u32,
        bronze: bool,
    ) -> Self {
        let round_count = bracket_size.trailing_zeros();
        let mut positions = Vec::with_capacity(bracket_size as usize);

        for round in 1..=round_count {
            let matches_in_round = bracket_size >> round;
            for position in 1..=matches_in_round {
                positions.push(BracketPosition::Slot { round, position });
            }
        }
        if bronze && round_count >= 2 {
            positions.push(BracketPosition::Bronze);
        }

        let scope = IdScope::Bracket(bracket_type);
        let mut index = Self {
            temp_to_position: HashMap::with_capacity(positions.len()),
            position_to_temp: HashMap::with_capacity(positions.len()),
            position_to_canonical: HashMap::with_capacity(positions.len()),
        };

        for (i, position) in positions.into_iter().enumerate() {
            let temp = TempId(i as u32 + 1);
            index.temp_to_position.insert(temp, position);
            index.position_to_temp.insert(position, temp);
            index
                .position_to_canonical
                .insert(position, ids.canonical_id(division, &scope, &position.coordinate()));
        }

        index
    }

    pub fn len(&self) -> usize {
        self.temp_to_position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.temp_to_position.is_empty()
    }

    /// Temp id assigned to a position.
    ///
    /// # Errors
    ///
    /// * `BracketError::UnresolvedTempId` - Position outside the laid-out tree
    pub fn temp_id(&self, position: BracketPosition) -> BracketResult<TempId> {
        self.position_to_temp
            .get(&position)
            .copied()
            .ok_or_else(|| BracketError::UnresolvedTempId {
                temp_id: 0,
                context: format!("no temp id for position {position:?}"),
            })
    }

    pub fn position(&self, temp: TempId) -> BracketResult<BracketPosition> {
        self.temp_to_position
            .get(&temp)
            .copied()
            .ok_or_else(|| BracketError::UnresolvedTempId {
                temp_id: temp.0,
                context: "temp id was never assigned a position".to_string(),
            })
    }

    /// Translate a temp id into its canonical match id.
    ///
    /// # Errors
    ///
    /// * `BracketError::UnresolvedTempId` - Either lookup misses
    pub fn resolve(&self, temp: TempId) -> BracketResult<MatchId> {
        let position = self.position(temp)?;
        self.position_to_canonical
            .get(&position)
            .cloned()
            .ok_or_else(|| BracketError::UnresolvedTempId {
                temp_id: temp.0,
                context: format!("no canonical id for position {position:?}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::division::DefaultIdStrategy;

    fn index(size: u32, bronze: bool) -> PositionIndex {
        PositionIndex::build(
            &DefaultIdStrategy,
            &DivisionKey::new("t", "open"),
            BracketType::Main,
            size,
            bronze,
        )
    }

    #[test]
    fn test_eight_bracket_layout() {
        let index = index(8, true);
        // 4 + 2 + 1 + bronze
        assert_eq!(index.len(), 8);

        let first = index
            .temp_id(BracketPosition::Slot { round: 1, position: 1 })
            .unwrap();
        assert_eq!(first, TempId(1));
        assert_eq!(index.resolve(first).unwrap(), "open_main_r1m1");

        let bronze = index.temp_id(BracketPosition::Bronze).unwrap();
        assert_eq!(bronze, TempId(8));
        assert_eq!(index.resolve(bronze).unwrap(), "open_main_bronze");
    }

    #[test]
    fn test_two_bracket_has_no_bronze() {
        let index = index(2, true);
        assert_eq!(index.len(), 1);
        assert!(index.temp_id(BracketPosition::Bronze).is_err());
    }

    #[test]
    fn test_unresolved_temp_id_is_an_error() {
        let index = index(4, false);
        assert!(matches!(
            index.resolve(TempId(99)),
            Err(BracketError::UnresolvedTempId { temp_id: 99, .. })
        ));
    }
}
