use crate::config::LeaderboardConfig;
use crate::error::AppError;
use crate::models::{LeaderboardEntry, TriviaScore, User, UserTriviaStats};
use crate::session::TriviaSession;
use crate::store::SqliteStore;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderboardScope {
    Global,
    Movie(i64),
    Collection,
}

pub struct LeaderboardService {
    store: SqliteStore,
    config: LeaderboardConfig,
}

impl LeaderboardService {
    pub fn new(store: SqliteStore, config: LeaderboardConfig) -> Self {
        Self { store, config }
    }

    pub async fn leaderboard(
        &self,
        scope: LeaderboardScope,
        limit: Option<i64>,
    ) -> Result<Vec<LeaderboardEntry>, AppError> {
        match scope {
            LeaderboardScope::Global => {
                self.store
                    .global_leaderboard(limit.unwrap_or_else(|| self.config.global_limit()))
                    .await
            }
            LeaderboardScope::Movie(movie_id) => {
                self.store
                    .movie_leaderboard(movie_id, limit.unwrap_or_else(|| self.config.movie_limit()))
                    .await
            }
            LeaderboardScope::Collection => {
                self.store
                    .collection_leaderboard(limit.unwrap_or_else(|| self.config.collection_limit()))
                    .await
            }
        }
    }

    /// Persists a completed session's score. A storage failure is logged and
    /// swallowed: the player still gets their results either way.
    pub async fn save_score(
        &self,
        session: &TriviaSession,
        completion_time: Option<f64>,
    ) -> Option<TriviaScore> {
        let record = session.to_score_record(completion_time);
        match self.store.insert_trivia_score(&record).await {
            Ok(saved) => {
                info!(
                    user_id = saved.user_id,
                    trivia_type = %saved.trivia_type,
                    percentage = saved.percentage,
                    "Trivia score saved"
                );
                Some(saved)
            }
            Err(e) => {
                warn!("Failed to save trivia score: {}", e);
                None
            }
        }
    }

    pub async fn user_stats(&self, user_id: i64) -> Result<(User, UserTriviaStats), AppError> {
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or(AppError::UserNotFound(user_id))?;
        let stats = self
            .store
            .user_trivia_stats(user_id, self.config.recent_limit())
            .await?;
        Ok((user, stats))
    }
}
