use crate::config::TriviaConfig;
use crate::models::{ApiSource, NewTriviaScore, Question, TriviaType};
use crate::trivia::GeneratedTrivia;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    Movie { movie_id: i64 },
    Collection,
}

impl SessionKind {
    pub fn trivia_type(&self) -> TriviaType {
        match self {
            SessionKind::Movie { .. } => TriviaType::Movie,
            SessionKind::Collection => TriviaType::Collection,
        }
    }

    pub fn movie_id(&self) -> Option<i64> {
        match self {
            SessionKind::Movie { movie_id } => Some(*movie_id),
            SessionKind::Collection => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnswerRecord {
    pub question: String,
    pub user_answer: usize,
    pub correct_answer: usize,
    pub is_correct: bool,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub current: usize,
    pub total: usize,
    pub percentage: i64,
}

pub enum SessionView<'a> {
    InProgress {
        question: &'a Question,
        progress: Progress,
    },
    Complete,
}

/// One quiz in flight: advances answer by answer until every question has
/// been consumed, then only yields results.
#[derive(Debug, Clone)]
pub struct TriviaSession {
    pub kind: SessionKind,
    pub user_id: i64,
    pub api_used: ApiSource,
    questions: Vec<Question>,
    current_question: usize,
    score: i64,
    answers: Vec<AnswerRecord>,
}

impl TriviaSession {
    pub fn new(trivia: GeneratedTrivia) -> Self {
        let kind = match trivia.movie_id {
            Some(movie_id) => SessionKind::Movie { movie_id },
            None => SessionKind::Collection,
        };
        Self {
            kind,
            user_id: trivia.user_id,
            api_used: trivia.api_used,
            questions: trivia.questions,
            current_question: 0,
            score: 0,
            answers: Vec::new(),
        }
    }

    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    pub fn score(&self) -> i64 {
        self.score
    }

    pub fn answers(&self) -> &[AnswerRecord] {
        &self.answers
    }

    pub fn is_complete(&self) -> bool {
        self.current_question >= self.questions.len()
    }

    pub fn current_question(&self) -> SessionView<'_> {
        if self.is_complete() {
            return SessionView::Complete;
        }

        let question = &self.questions[self.current_question];
        let current = self.current_question + 1;
        let total = self.questions.len();
        SessionView::InProgress {
            question,
            progress: Progress {
                current,
                total,
                percentage: percentage(current as i64, total as i64),
            },
        }
    }

    /// Records the answer for the current question and advances. Submitting
    /// to a completed session is a no-op: no new record, no score change.
    pub fn submit_answer(&mut self, user_answer: usize) {
        if self.is_complete() {
            debug!("Ignoring answer for a completed session");
            return;
        }

        let question = &self.questions[self.current_question];
        let correct_answer = question.correct;
        let is_correct = user_answer == correct_answer;

        self.answers.push(AnswerRecord {
            question: question.question.clone(),
            user_answer,
            correct_answer,
            is_correct,
            options: question.options.clone(),
        });

        if is_correct {
            self.score += 1;
        }
        self.current_question += 1;
    }

    pub fn results(&self, config: &TriviaConfig) -> TriviaResults {
        let total = self.questions.len() as i64;
        let pct = percentage(self.score, total);
        TriviaResults {
            score: self.score,
            total,
            percentage: pct,
            performance: performance_badge(pct, config),
            answers: self.answers.clone(),
            trivia_type: self.kind.trivia_type(),
            api_used: self.api_used,
        }
    }

    pub fn to_score_record(&self, completion_time: Option<f64>) -> NewTriviaScore {
        let total = self.questions.len() as i64;
        NewTriviaScore {
            user_id: self.user_id,
            movie_id: self.kind.movie_id(),
            trivia_type: self.kind.trivia_type(),
            score: self.score,
            total_questions: total,
            percentage: percentage(self.score, total),
            completion_time,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TriviaResults {
    pub score: i64,
    pub total: i64,
    pub percentage: i64,
    pub performance: PerformanceBadge,
    pub answers: Vec<AnswerRecord>,
    pub trivia_type: TriviaType,
    pub api_used: ApiSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PerformanceBadge {
    Master,
    Expert,
    Buff,
    GettingThere,
    StudyMore,
}

impl PerformanceBadge {
    pub fn label(&self) -> &'static str {
        match self {
            PerformanceBadge::Master => "Movie Master",
            PerformanceBadge::Expert => "Cinema Expert",
            PerformanceBadge::Buff => "Movie Buff",
            PerformanceBadge::GettingThere => "Getting There",
            PerformanceBadge::StudyMore => "Study More",
        }
    }
}

pub fn percentage(score: i64, total: i64) -> i64 {
    if total == 0 {
        return 0;
    }
    ((score as f64 / total as f64) * 100.0).round() as i64
}

// Step function over the whole 0..=100 range; thresholds come from config
// and stay ordered.
pub fn performance_badge(percentage: i64, config: &TriviaConfig) -> PerformanceBadge {
    if percentage >= config.master_threshold() {
        PerformanceBadge::Master
    } else if percentage >= config.expert_threshold() {
        PerformanceBadge::Expert
    } else if percentage >= config.buff_threshold() {
        PerformanceBadge::Buff
    } else if percentage >= config.learning_threshold() {
        PerformanceBadge::GettingThere
    } else {
        PerformanceBadge::StudyMore
    }
}

/// At most one active quiz per session key; starting a new run silently
/// replaces an unfinished one, and abandoned runs are never scored.
#[derive(Default)]
pub struct SessionStore {
    active: HashMap<Uuid, TriviaSession>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, key: Uuid, session: TriviaSession) {
        if let Some(previous) = self.active.insert(key, session) {
            if !previous.is_complete() {
                info!(user_id = previous.user_id, "Replacing unfinished trivia session");
            }
        }
    }

    pub fn get_mut(&mut self, key: &Uuid) -> Option<&mut TriviaSession> {
        self.active.get_mut(key)
    }

    /// Explicit quit: the session is discarded and nothing is scored.
    pub fn quit(&mut self, key: &Uuid) -> Option<TriviaSession> {
        let session = self.active.remove(key);
        if session.is_some() {
            info!("Trivia session ended early");
        }
        session
    }

    /// Consumes the session once it is complete. The removal is what keeps a
    /// finished run from being scored twice: a second call finds nothing.
    pub fn take_completed(&mut self, key: &Uuid) -> Option<TriviaSession> {
        match self.active.get(key) {
            Some(session) if session.is_complete() => self.active.remove(key),
            _ => None,
        }
    }
}
