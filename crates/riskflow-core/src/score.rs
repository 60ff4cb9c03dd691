//! Grades do not scale with the matrix size; a 3x3 matrix never grades above Medium.

use serde::{Deserialize, Serialize};

use crate::ValidationError;
use crate::record::Strategy;
use crate::schema::Field;

pub const VERY_HIGH_MIN_SCORE: u32 = 20;
pub const HIGH_MIN_SCORE: u32 = 15;
pub const MEDIUM_MIN_SCORE: u32 = 8;
pub const MITIGATE_RECOMMENDATION_MIN_SCORE: u32 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MatrixBound {
    Three,
    #[default]
    Five,
}

impl MatrixBound {
    pub fn max_level(self) -> u8 {
        match self {
            Self::Three => 3,
            Self::Five => 5,
        }
    }

    pub fn from_max_level(max_level: u8) -> Option<Self> {
        match max_level {
            3 => Some(Self::Three),
            5 => Some(Self::Five),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Level(u8);

impl Level {
    pub fn new(value: i64, bound: MatrixBound) -> Option<Self> {
        let max = i64::from(bound.max_level());
        (1..=max).contains(&value).then(|| Self(value as u8))
    }

    /// Parses a string-encoded level. Empty input is `Ok(None)`.
    pub fn parse_field(
        field: Field,
        raw: &str,
        bound: MatrixBound,
    ) -> Result<Option<Self>, ValidationError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }

        let value = raw
            .parse::<i64>()
            .map_err(|_| ValidationError::NotAnInteger {
                field,
                value: raw.to_owned(),
            })?;

        Self::new(value, bound)
            .map(Some)
            .ok_or(ValidationError::LevelOutOfRange {
                field,
                value,
                max: bound.max_level(),
            })
    }

    pub fn get(self) -> u8 {
        self.0
    }

    fn shifted(self, delta: i8, bound: MatrixBound) -> Self {
        let shifted = (i16::from(self.0) + i16::from(delta)).clamp(1, i16::from(bound.max_level()));
        Self(shifted as u8)
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl Grade {
    pub fn code(self) -> &'static str {
        match self {
            Self::Low => "L",
            Self::Medium => "M",
            Self::High => "H",
            Self::VeryHigh => "VH",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::VeryHigh => "Very High",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResidualLevels {
    pub impact: Level,
    pub likelihood: Level,
}

pub fn compute_score(impact: Level, likelihood: Level) -> u32 {
    u32::from(impact.get()) * u32::from(likelihood.get())
}

pub fn grade_from_score(score: u32) -> Grade {
    if score >= VERY_HIGH_MIN_SCORE {
        Grade::VeryHigh
    } else if score >= HIGH_MIN_SCORE {
        Grade::High
    } else if score >= MEDIUM_MIN_SCORE {
        Grade::Medium
    } else {
        Grade::Low
    }
}

pub fn strategy_deltas(strategy: Option<Strategy>) -> (i8, i8) {
    match strategy.unwrap_or(Strategy::Mitigate) {
        Strategy::Mitigate => (-1, -1),
        Strategy::Transfer => (0, -1),
        Strategy::Avoid => (-2, 0),
        Strategy::Accept => (0, 0),
    }
}

pub fn derive_residual(
    base_impact: Level,
    base_likelihood: Level,
    strategy: Option<Strategy>,
    bound: MatrixBound,
) -> ResidualLevels {
    let (impact_delta, likelihood_delta) = strategy_deltas(strategy);
    ResidualLevels {
        impact: base_impact.shifted(impact_delta, bound),
        likelihood: base_likelihood.shifted(likelihood_delta, bound),
    }
}

pub fn recommend_strategy(score: u32) -> Strategy {
    if score >= MITIGATE_RECOMMENDATION_MIN_SCORE {
        Strategy::Mitigate
    } else {
        Strategy::Accept
    }
}

pub fn is_acceptable(score: u32, accept_threshold: u32) -> bool {
    score <= accept_threshold
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreView {
    pub impact: Level,
    pub likelihood: Level,
    pub score: u32,
    pub grade: Grade,
    pub acceptable: bool,
}

impl ScoreView {
    pub fn new(impact: Level, likelihood: Level, accept_threshold: u32) -> Self {
        let score = compute_score(impact, likelihood);
        Self {
            impact,
            likelihood,
            score,
            grade: grade_from_score(score),
            acceptable: is_acceptable(score, accept_threshold),
        }
    }

    pub fn from_fields(
        impact: &str,
        likelihood: &str,
        bound: MatrixBound,
        accept_threshold: u32,
    ) -> Option<Self> {
        let impact = Level::parse_field(Field::Impact, impact, bound).ok()??;
        let likelihood = Level::parse_field(Field::Likelihood, likelihood, bound).ok()??;
        Some(Self::new(impact, likelihood, accept_threshold))
    }
}
