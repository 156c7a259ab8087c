//! Competition domain type definitions
//!
//! Sports, disciplines, athlete attributes, record types and scoring formulas.
//! Every enum round-trips through `Display`/`FromStr` so stores can keep them
//! as plain text columns.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Strength sport governing the competition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sport {
    Powerlifting,
    BenchPress,
    Weightlifting,
    Streetlifting,
    Strongman,
}

impl Sport {
    /// Disciplines summed into the total, in competition order
    ///
    /// Strongman returns an empty list: its events are defined per competition.
    pub fn disciplines(&self) -> Vec<Discipline> {
        match self {
            Sport::Powerlifting => vec![Discipline::Squat, Discipline::BenchPress, Discipline::Deadlift],
            Sport::BenchPress => vec![Discipline::BenchPress],
            Sport::Weightlifting => vec![Discipline::Snatch, Discipline::CleanAndJerk],
            Sport::Streetlifting => vec![
                Discipline::MuscleUp,
                Discipline::PullUp,
                Discipline::Dip,
                Discipline::Squat,
            ],
            Sport::Strongman => Vec::new(),
        }
    }

    /// Formula used for cross-category ranking unless the competition overrides it
    pub fn default_formula(&self) -> ScoringFormula {
        match self {
            Sport::Powerlifting | Sport::BenchPress => ScoringFormula::IpfGl,
            Sport::Weightlifting => ScoringFormula::Sinclair,
            Sport::Streetlifting => ScoringFormula::Wilks,
            Sport::Strongman => ScoringFormula::StrongmanPoints,
        }
    }

    /// Whether attempts are progressive loads (ascending weight rule applies)
    pub fn is_progressive(&self) -> bool {
        !matches!(self, Sport::Strongman)
    }
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Sport::Powerlifting => "powerlifting",
            Sport::BenchPress => "bench_press",
            Sport::Weightlifting => "weightlifting",
            Sport::Streetlifting => "streetlifting",
            Sport::Strongman => "strongman",
        };
        f.write_str(s)
    }
}

impl FromStr for Sport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "powerlifting" => Ok(Sport::Powerlifting),
            "bench_press" => Ok(Sport::BenchPress),
            "weightlifting" => Ok(Sport::Weightlifting),
            "streetlifting" => Ok(Sport::Streetlifting),
            "strongman" => Ok(Sport::Strongman),
            other => Err(format!("unknown sport: {}", other)),
        }
    }
}

/// A single lift or event within a sport
///
/// `Total` is only used as a record key discipline. Strongman events carry
/// their own slug (e.g. `Event("log_press")`). Serializes as its text form
/// (`"squat"`, `"event:log_press"`) so it can key JSON maps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Discipline {
    Squat,
    BenchPress,
    Deadlift,
    Snatch,
    CleanAndJerk,
    MuscleUp,
    PullUp,
    Dip,
    Total,
    Event(String),
}

impl Discipline {
    pub fn is_strongman_event(&self) -> bool {
        matches!(self, Discipline::Event(_))
    }
}

impl fmt::Display for Discipline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discipline::Squat => f.write_str("squat"),
            Discipline::BenchPress => f.write_str("bench_press"),
            Discipline::Deadlift => f.write_str("deadlift"),
            Discipline::Snatch => f.write_str("snatch"),
            Discipline::CleanAndJerk => f.write_str("clean_and_jerk"),
            Discipline::MuscleUp => f.write_str("muscle_up"),
            Discipline::PullUp => f.write_str("pull_up"),
            Discipline::Dip => f.write_str("dip"),
            Discipline::Total => f.write_str("total"),
            Discipline::Event(slug) => write!(f, "event:{}", slug),
        }
    }
}

impl From<Discipline> for String {
    fn from(discipline: Discipline) -> Self {
        discipline.to_string()
    }
}

impl TryFrom<String> for Discipline {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl FromStr for Discipline {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(slug) = s.strip_prefix("event:") {
            if slug.is_empty() {
                return Err("empty strongman event slug".to_string());
            }
            return Ok(Discipline::Event(slug.to_string()));
        }
        match s {
            "squat" => Ok(Discipline::Squat),
            "bench_press" => Ok(Discipline::BenchPress),
            "deadlift" => Ok(Discipline::Deadlift),
            "snatch" => Ok(Discipline::Snatch),
            "clean_and_jerk" => Ok(Discipline::CleanAndJerk),
            "muscle_up" => Ok(Discipline::MuscleUp),
            "pull_up" => Ok(Discipline::PullUp),
            "dip" => Ok(Discipline::Dip),
            "total" => Ok(Discipline::Total),
            other => Err(format!("unknown discipline: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    Male,
    Female,
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sex::Male => f.write_str("male"),
            Sex::Female => f.write_str("female"),
        }
    }
}

impl FromStr for Sex {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" | "m" | "M" => Ok(Sex::Male),
            "female" | "f" | "F" => Ok(Sex::Female),
            other => Err(format!("unknown sex: {}", other)),
        }
    }
}

/// Powerlifting equipment division
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Equipment {
    #[default]
    Raw,
    Equipped,
}

impl fmt::Display for Equipment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Equipment::Raw => f.write_str("raw"),
            Equipment::Equipped => f.write_str("equipped"),
        }
    }
}

impl FromStr for Equipment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw" | "classic" => Ok(Equipment::Raw),
            "equipped" => Ok(Equipment::Equipped),
            other => Err(format!("unknown equipment: {}", other)),
        }
    }
}

/// Scope of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Competition,
    Regional,
    National,
    Continental,
    World,
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecordType::Competition => "competition",
            RecordType::Regional => "regional",
            RecordType::National => "national",
            RecordType::Continental => "continental",
            RecordType::World => "world",
        };
        f.write_str(s)
    }
}

impl FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "competition" => Ok(RecordType::Competition),
            "regional" => Ok(RecordType::Regional),
            "national" => Ok(RecordType::National),
            "continental" => Ok(RecordType::Continental),
            "world" => Ok(RecordType::World),
            other => Err(format!("unknown record type: {}", other)),
        }
    }
}

/// Named score normalization used for ranking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringFormula {
    /// Unnormalized total
    RawTotal,
    Wilks,
    Dots,
    /// IPF points (2019 formula)
    Ipf,
    /// IPF GL points (2020 formula)
    IpfGl,
    Sinclair,
    /// Sinclair with the Meltzer-Faber masters age coefficient
    Smf,
    /// Summed per-event placing points
    StrongmanPoints,
}

impl ScoringFormula {
    /// Formulas reported alongside the ranking formula in score records
    pub fn reported_for(sport: Sport) -> &'static [ScoringFormula] {
        match sport {
            Sport::Powerlifting | Sport::BenchPress | Sport::Streetlifting => &[
                ScoringFormula::Wilks,
                ScoringFormula::Dots,
                ScoringFormula::Ipf,
                ScoringFormula::IpfGl,
            ],
            Sport::Weightlifting => &[ScoringFormula::Sinclair, ScoringFormula::Smf],
            Sport::Strongman => &[],
        }
    }
}

impl fmt::Display for ScoringFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScoringFormula::RawTotal => "raw_total",
            ScoringFormula::Wilks => "wilks",
            ScoringFormula::Dots => "dots",
            ScoringFormula::Ipf => "ipf",
            ScoringFormula::IpfGl => "ipf_gl",
            ScoringFormula::Sinclair => "sinclair",
            ScoringFormula::Smf => "smf",
            ScoringFormula::StrongmanPoints => "strongman_points",
        };
        f.write_str(s)
    }
}

impl FromStr for ScoringFormula {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "raw_total" => Ok(ScoringFormula::RawTotal),
            "wilks" => Ok(ScoringFormula::Wilks),
            "dots" => Ok(ScoringFormula::Dots),
            "ipf" => Ok(ScoringFormula::Ipf),
            "ipf_gl" | "gl" => Ok(ScoringFormula::IpfGl),
            "sinclair" => Ok(ScoringFormula::Sinclair),
            "smf" => Ok(ScoringFormula::Smf),
            "strongman_points" => Ok(ScoringFormula::StrongmanPoints),
            other => Err(format!("unknown scoring formula: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discipline_text_roundtrip() {
        let all = vec![
            Discipline::Squat,
            Discipline::BenchPress,
            Discipline::Deadlift,
            Discipline::Snatch,
            Discipline::CleanAndJerk,
            Discipline::MuscleUp,
            Discipline::PullUp,
            Discipline::Dip,
            Discipline::Total,
            Discipline::Event("log_press".to_string()),
        ];
        for d in all {
            assert_eq!(d.to_string().parse::<Discipline>().unwrap(), d);
        }
        assert!("event:".parse::<Discipline>().is_err());
        assert!("curl".parse::<Discipline>().is_err());
    }

    #[test]
    fn test_discipline_serializes_as_map_key() {
        let mut bests = std::collections::BTreeMap::new();
        bests.insert(Discipline::Squat, 185.0);
        bests.insert(Discipline::Event("yoke".to_string()), 42.5);

        let json = serde_json::to_string(&bests).unwrap();
        assert!(json.contains("\"event:yoke\":42.5"));

        let back: std::collections::BTreeMap<Discipline, f64> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, bests);
    }

    #[test]
    fn test_powerlifting_disciplines() {
        assert_eq!(
            Sport::Powerlifting.disciplines(),
            vec![Discipline::Squat, Discipline::BenchPress, Discipline::Deadlift]
        );
        assert!(Sport::Strongman.disciplines().is_empty());
        assert!(!Sport::Strongman.is_progressive());
    }

    #[test]
    fn test_formula_parse_aliases() {
        assert_eq!("gl".parse::<ScoringFormula>().unwrap(), ScoringFormula::IpfGl);
        assert_eq!(
            ScoringFormula::Smf.to_string().parse::<ScoringFormula>().unwrap(),
            ScoringFormula::Smf
        );
    }

    #[test]
    fn test_sport_serde_snake_case() {
        let json = serde_json::to_string(&Sport::BenchPress).unwrap();
        assert_eq!(json, "\"bench_press\"");
    }
}
