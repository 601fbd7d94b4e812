use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::FromRow;
use std::fmt;
use std::sync::OnceLock;

pub const OPTIONS_PER_QUESTION: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Movie {
    pub id: i64,
    pub title: String,
    pub director: Option<String>,
    pub year: Option<i32>,
    pub rating: Option<f64>,
    pub genre: Option<String>,
    pub poster_url: Option<String>,
    pub user_id: i64,
}

#[derive(Debug, Clone, Default)]
pub struct NewMovie {
    pub title: String,
    pub director: Option<String>,
    pub year: Option<i32>,
    pub rating: Option<f64>,
    pub genre: Option<String>,
    pub poster_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Review {
    pub id: i64,
    pub movie_id: i64,
    pub content: String,
    pub reviewer_rating: Option<i64>,
    pub likes: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum TriviaType {
    Movie,
    Collection,
}

impl TriviaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriviaType::Movie => "movie",
            TriviaType::Collection => "collection",
        }
    }
}

impl fmt::Display for TriviaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one completed quiz. Insert-only: leaderboards and user
/// statistics are derived from these rows, so there is no update path.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TriviaScore {
    pub id: i64,
    pub user_id: i64,
    pub movie_id: Option<i64>,
    pub trivia_type: TriviaType,
    pub score: i64,
    pub total_questions: i64,
    pub percentage: i64,
    pub completion_time: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTriviaScore {
    pub user_id: i64,
    pub movie_id: Option<i64>,
    pub trivia_type: TriviaType,
    pub score: i64,
    pub total_questions: i64,
    pub percentage: i64,
    pub completion_time: Option<f64>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LeaderboardEntry {
    pub user_id: i64,
    pub user_name: String,
    pub movie_id: Option<i64>,
    pub movie_title: Option<String>,
    pub trivia_type: TriviaType,
    pub score: i64,
    pub total_questions: i64,
    pub percentage: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct UserTriviaStats {
    pub total_attempts: i64,
    pub best_percentage: i64,
    pub average_percentage: i64,
    pub movie_attempts: i64,
    pub collection_attempts: i64,
    pub recent_scores: Vec<TriviaScore>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiSource {
    RapidApi,
    OpenAi,
    Mock,
}

impl ApiSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiSource::RapidApi => "rapidapi",
            ApiSource::OpenAi => "openai",
            ApiSource::Mock => "mock",
        }
    }
}

impl fmt::Display for ApiSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
    VeryHard,
    HighestDifficulty,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
            Difficulty::VeryHard => "very hard",
            Difficulty::HighestDifficulty => "highest difficulty",
        }
    }

    // Unknown labels degrade to medium instead of rejecting the question.
    fn parse(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "easy" => Difficulty::Easy,
            "medium" => Difficulty::Medium,
            "hard" => Difficulty::Hard,
            "very hard" => Difficulty::VeryHard,
            "highest difficulty" => Difficulty::HighestDifficulty,
            _ => Difficulty::Medium,
        }
    }
}

impl Serialize for Difficulty {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Difficulty {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Ok(Difficulty::parse(&label))
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub question: String,
    pub options: Vec<String>,
    pub correct: usize,
    #[serde(default)]
    pub difficulty: Difficulty,
}

impl Question {
    pub fn is_well_formed(&self) -> bool {
        !self.question.trim().is_empty()
            && self.options.len() == OPTIONS_PER_QUESTION
            && self.correct < self.options.len()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuestionSet {
    pub questions: Vec<Question>,
}

fn question_object_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"(?s)\{.*"questions".*\}"#).expect("valid regex"))
}

impl QuestionSet {
    /// Recover a question set from raw model output. Tries a direct JSON parse
    /// first, then falls back to a permissive scan for the first JSON object
    /// containing a "questions" key, tolerating prose the model may emit around
    /// it. Malformed questions are dropped; an empty result is `None`.
    pub fn extract(raw: &str) -> Option<QuestionSet> {
        let trimmed = raw.trim();

        let parsed = serde_json::from_str::<QuestionSet>(trimmed).ok().or_else(|| {
            let candidate = question_object_pattern().find(trimmed)?;
            serde_json::from_str::<QuestionSet>(candidate.as_str()).ok()
        })?;

        let questions: Vec<Question> = parsed
            .questions
            .into_iter()
            .filter(|q| {
                if !q.is_well_formed() {
                    tracing::warn!(question = %q.question, "Dropping malformed trivia question");
                    return false;
                }
                true
            })
            .collect();

        if questions.is_empty() {
            return None;
        }
        Some(QuestionSet { questions })
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}
