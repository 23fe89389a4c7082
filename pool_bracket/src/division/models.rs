//! Division data models: participants, pools, matches, standings and seed documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::bracket::qualifier::AdvancementRule;
use crate::generation::lock::{GenerationLock, LockFamily};
use crate::standings::Tiebreaker;

/// Tournament ID type
pub type TournamentId = String;

/// Division ID type
pub type DivisionId = String;

/// Participant ID type
pub type ParticipantId = String;

/// Canonical match / document ID type
pub type MatchId = String;

/// Address of a division inside a tournament
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DivisionKey {
    pub tournament_id: TournamentId,
    pub division_id: DivisionId,
}

impl DivisionKey {
    pub fn new(tournament_id: impl Into<String>, division_id: impl Into<String>) -> Self {
        Self {
            tournament_id: tournament_id.into(),
            division_id: division_id.into(),
        }
    }
}

impl fmt::Display for DivisionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tournament_id, self.division_id)
    }
}

/// A registered team or individual
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    /// Ordered member ids (players making up the team)
    pub member_ids: Vec<String>,
}

impl Participant {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            member_ids: Vec::new(),
        }
    }

    pub fn with_members(mut self, member_ids: Vec<String>) -> Self {
        self.member_ids = member_ids;
        self
    }

    /// Lightweight reference stored on match sides
    pub fn to_ref(&self) -> ParticipantRef {
        ParticipantRef {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }
}

/// Reference to a participant as carried on match documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRef {
    pub id: ParticipantId,
    pub name: String,
}

/// Round-robin group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    /// Normalized key ("A", "B", ...)
    pub key: String,
    /// Display name ("Pool A")
    pub name: String,
    pub participants: Vec<Participant>,
}

impl Pool {
    /// Create a pool, deriving its key from the display name
    pub fn new(name: impl Into<String>, participants: Vec<Participant>) -> Self {
        let name = name.into();
        Self {
            key: normalize_pool_key(&name),
            name,
            participants,
        }
    }

    pub fn size(&self) -> usize {
        self.participants.len()
    }

    pub fn contains(&self, participant_id: &str) -> bool {
        self.participants.iter().any(|p| p.id == participant_id)
    }

    /// Registration order of a participant inside the pool
    pub fn position_of(&self, participant_id: &str) -> Option<usize> {
        self.participants.iter().position(|p| p.id == participant_id)
    }
}

/// Normalize a pool display name into its key.
///
/// `"Pool a "` and `"a"` both become `"A"`; anything that is not
/// alphanumeric is dropped.
pub fn normalize_pool_key(name: &str) -> String {
    let trimmed = name.trim();
    let without_prefix = match trimmed.get(..5) {
        Some(prefix) if prefix.eq_ignore_ascii_case("pool ") => &trimmed[5..],
        _ => trimmed,
    };

    without_prefix
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Natural ordering of pool labels: `A < B < ... < Z < AA < AB`.
pub fn compare_pool_labels(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Stage a match belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Pool,
    Bracket,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Pool => write!(f, "pool"),
            Stage::Bracket => write!(f, "bracket"),
        }
    }
}

/// Which elimination bracket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BracketType {
    Main,
    Plate,
}

impl BracketType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BracketType::Main => "main",
            BracketType::Plate => "plate",
        }
    }
}

impl fmt::Display for BracketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BracketType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "main" => Ok(BracketType::Main),
            "plate" => Ok(BracketType::Plate),
            other => Err(format!("unknown bracket type: {other}")),
        }
    }
}

/// Side of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    A,
    B,
}

impl Slot {
    pub fn other(self) -> Slot {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }
}

/// Occupant of one side of a match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MatchSide {
    Participant(ParticipantRef),
    /// Waiting on a predecessor match
    Tbd,
    /// No opponent
    Bye,
}

impl MatchSide {
    pub fn is_tbd(&self) -> bool {
        matches!(self, MatchSide::Tbd)
    }

    pub fn is_bye(&self) -> bool {
        matches!(self, MatchSide::Bye)
    }

    pub fn participant(&self) -> Option<&ParticipantRef> {
        match self {
            MatchSide::Participant(p) => Some(p),
            _ => None,
        }
    }
}

/// Match lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Scheduled,
    InProgress,
    Completed,
    Forfeit,
}

impl MatchStatus {
    /// Completed, forfeited or decided by a BYE
    pub fn is_terminal(&self) -> bool {
        matches!(self, MatchStatus::Completed | MatchStatus::Forfeit)
    }
}

/// How a result came about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    Played,
    Forfeit,
    Bye,
}

/// Points in a single game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameScore {
    pub a: u32,
    pub b: u32,
}

impl GameScore {
    pub fn new(a: u32, b: u32) -> Self {
        Self { a, b }
    }
}

/// Recorded result of a match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub winner: Slot,
    pub kind: ResultKind,
    pub games: Vec<GameScore>,
    /// Only officially finalized results feed standings and advancement
    pub finalized: bool,
    pub recorded_at: Option<DateTime<Utc>>,
}

impl MatchResult {
    /// Result of a match decided by a BYE (no game played)
    pub fn bye(winner: Slot) -> Self {
        Self {
            winner,
            kind: ResultKind::Bye,
            games: Vec::new(),
            finalized: true,
            recorded_at: None,
        }
    }

    /// Total points scored by one side
    pub fn points(&self, slot: Slot) -> u32 {
        self.games
            .iter()
            .map(|g| match slot {
                Slot::A => g.a,
                Slot::B => g.b,
            })
            .sum()
    }
}

/// Scoring format for a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub best_of: u8,
    pub points_to_win: u32,
    pub win_by: u32,
    pub point_cap: Option<u32>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            best_of: 1,
            points_to_win: 21,
            win_by: 2,
            point_cap: None,
        }
    }
}

/// Per-round scoring overrides; unset rounds fall back to `pool`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundScoring {
    pub pool: ScoringConfig,
    pub quarterfinal: Option<ScoringConfig>,
    pub semifinal: Option<ScoringConfig>,
    pub final_round: Option<ScoringConfig>,
    pub bronze: Option<ScoringConfig>,
}

impl RoundScoring {
    /// Resolve scoring by distance from the final (0 = final, 1 = semi, 2 = quarter)
    pub fn for_distance(&self, distance_from_final: u32) -> ScoringConfig {
        let override_config = match distance_from_final {
            0 => self.final_round,
            1 => self.semifinal,
            2 => self.quarterfinal,
            _ => None,
        };
        override_config.unwrap_or(self.pool)
    }

    pub fn for_bronze(&self) -> ScoringConfig {
        self.bronze.unwrap_or(self.pool)
    }
}

/// A scheduled or played match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub id: MatchId,
    pub division: DivisionKey,
    pub stage: Stage,
    pub bracket_type: Option<BracketType>,
    pub pool_key: Option<String>,
    pub round: u32,
    /// 1-based position inside the round
    pub position: u32,
    pub side_a: MatchSide,
    pub side_b: MatchSide,
    pub next_match_id: Option<MatchId>,
    pub next_match_slot: Option<Slot>,
    pub loser_next_match_id: Option<MatchId>,
    pub loser_next_match_slot: Option<Slot>,
    pub is_bronze: bool,
    pub status: MatchStatus,
    pub result: Option<MatchResult>,
    pub scoring: ScoringConfig,
}

impl Match {
    pub fn side(&self, slot: Slot) -> &MatchSide {
        match slot {
            Slot::A => &self.side_a,
            Slot::B => &self.side_b,
        }
    }

    pub fn side_mut(&mut self, slot: Slot) -> &mut MatchSide {
        match slot {
            Slot::A => &mut self.side_a,
            Slot::B => &mut self.side_b,
        }
    }

    pub fn has_finalized_result(&self) -> bool {
        self.status.is_terminal() && self.result.as_ref().is_some_and(|r| r.finalized)
    }

    /// Decided by a BYE rather than played
    pub fn is_bye(&self) -> bool {
        self.result
            .as_ref()
            .is_some_and(|r| r.kind == ResultKind::Bye)
    }

    pub fn winner(&self) -> Option<&ParticipantRef> {
        let result = self.result.as_ref().filter(|r| r.finalized)?;
        self.side(result.winner).participant()
    }

    pub fn loser(&self) -> Option<&ParticipantRef> {
        let result = self.result.as_ref().filter(|r| r.finalized)?;
        self.side(result.winner.other()).participant()
    }

    pub fn involves(&self, participant_id: &str) -> bool {
        [&self.side_a, &self.side_b]
            .iter()
            .any(|s| s.participant().is_some_and(|p| p.id == participant_id))
    }
}

/// One row of a pool's ranked standings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandingRow {
    pub participant_id: ParticipantId,
    pub name: String,
    pub rank: u32,
    pub played: u32,
    pub wins: u32,
    pub losses: u32,
    pub points_for: u32,
    pub points_against: u32,
    pub differential: i64,
}

/// Ranked standings of one pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStandings {
    pub pool_key: String,
    pub rows: Vec<StandingRow>,
    /// Latest `recorded_at` among the results that contributed
    pub watermark: Option<DateTime<Utc>>,
    /// Identity and content of the contributing results; see
    /// [`results_fingerprint`](crate::standings::results_fingerprint)
    #[serde(default)]
    pub fingerprint: String,
}

impl PoolStandings {
    pub fn row_at_rank(&self, rank: u32) -> Option<&StandingRow> {
        self.rows.iter().find(|r| r.rank == rank)
    }
}

/// Qualifying participant keyed by pool letter + rank ("A1")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedSlot {
    pub key: String,
    pub participant: ParticipantRef,
    pub pool_key: String,
    pub pool_rank: u32,
}

impl SeedSlot {
    pub fn slot_key(pool_key: &str, pool_rank: u32) -> String {
        format!("{pool_key}{pool_rank}")
    }
}

/// Round-1 pairing; `side_b == None` means a BYE
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedPair {
    pub side_a: String,
    pub side_b: Option<String>,
}

impl SeedPair {
    pub fn is_bye(&self) -> bool {
        self.side_b.is_none()
    }
}

/// Canonical seed document; source of truth for bracket match generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedDocument {
    pub id: MatchId,
    pub bracket_type: BracketType,
    pub bracket_size: u32,
    pub round_count: u32,
    pub round1_match_count: u32,
    pub bye_count: u32,
    pub slots: BTreeMap<String, SeedSlot>,
    pub round1_pairs: Vec<SeedPair>,
}

impl SeedDocument {
    /// Zero-size document for a bracket with fewer than two entrants
    pub fn empty(id: MatchId, bracket_type: BracketType) -> Self {
        Self {
            id,
            bracket_type,
            bracket_size: 0,
            round_count: 0,
            round1_match_count: 0,
            bye_count: 0,
            slots: BTreeMap::new(),
            round1_pairs: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bracket_size == 0
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

/// Per-division generation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivisionConfig {
    pub advancement: AdvancementRule,
    pub tiebreakers: Vec<Tiebreaker>,
    pub plate_enabled: bool,
    pub bronze_match: bool,
    pub scoring: RoundScoring,
}

impl Default for DivisionConfig {
    fn default() -> Self {
        Self {
            advancement: AdvancementRule::Top2,
            tiebreakers: Tiebreaker::default_chain(),
            plate_enabled: false,
            bronze_match: false,
            scoring: RoundScoring::default(),
        }
    }
}

/// Division record carrying the generation locks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivisionRecord {
    pub key: DivisionKey,
    pub name: String,
    pub config: DivisionConfig,
    pub pool_lock: GenerationLock,
    pub bracket_lock: GenerationLock,
}

impl DivisionRecord {
    pub fn new(key: DivisionKey, name: impl Into<String>, config: DivisionConfig) -> Self {
        Self {
            key,
            name: name.into(),
            config,
            pool_lock: GenerationLock::default(),
            bracket_lock: GenerationLock::default(),
        }
    }

    pub fn lock(&self, family: LockFamily) -> &GenerationLock {
        match family {
            LockFamily::PoolSchedule => &self.pool_lock,
            LockFamily::Bracket => &self.bracket_lock,
        }
    }

    pub fn lock_mut(&mut self, family: LockFamily) -> &mut GenerationLock {
        match family {
            LockFamily::PoolSchedule => &mut self.pool_lock,
            LockFamily::Bracket => &mut self.bracket_lock,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_pool_key() {
        assert_eq!(normalize_pool_key("Pool a "), "A");
        assert_eq!(normalize_pool_key("POOL B"), "B");
        assert_eq!(normalize_pool_key("c"), "C");
        assert_eq!(normalize_pool_key(" aa-1"), "AA1");
    }

    #[test]
    fn test_pool_label_ordering() {
        let mut labels = vec!["AA", "B", "A", "Z"];
        labels.sort_by(|a, b| compare_pool_labels(a, b));
        assert_eq!(labels, vec!["A", "B", "Z", "AA"]);
    }

    #[test]
    fn test_round_scoring_fallback() {
        let semi = ScoringConfig {
            best_of: 3,
            ..ScoringConfig::default()
        };
        let scoring = RoundScoring {
            semifinal: Some(semi),
            ..RoundScoring::default()
        };

        assert_eq!(scoring.for_distance(1), semi);
        assert_eq!(scoring.for_distance(0), ScoringConfig::default());
        assert_eq!(scoring.for_distance(5), ScoringConfig::default());
        assert_eq!(scoring.for_bronze(), ScoringConfig::default());
    }

    #[test]
    fn test_result_points() {
        let result = MatchResult {
            winner: Slot::A,
            kind: ResultKind::Played,
            games: vec![GameScore::new(21, 15), GameScore::new(19, 21), GameScore::new(15, 10)],
            finalized: true,
            recorded_at: None,
        };
        assert_eq!(result.points(Slot::A), 55);
        assert_eq!(result.points(Slot::B), 46);
    }

    #[test]
    fn test_match_status_terminal() {
        assert!(MatchStatus::Completed.is_terminal());
        assert!(MatchStatus::Forfeit.is_terminal());
        assert!(!MatchStatus::Scheduled.is_terminal());
        assert!(!MatchStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_bracket_type_parse() {
        assert_eq!("Main".parse::<BracketType>(), Ok(BracketType::Main));
        assert_eq!("plate".parse::<BracketType>(), Ok(BracketType::Plate));
        assert!("consolation".parse::<BracketType>().is_err());
    }
}
