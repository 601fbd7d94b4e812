use crate::error::AppError;
use crate::models::{
    LeaderboardEntry, Movie, NewMovie, NewTriviaScore, Review, TriviaScore, TriviaType, User,
    UserTriviaStats,
};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::error::ErrorKind;
use tracing::info;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS movies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    director TEXT,
    year INTEGER,
    rating REAL,
    genre TEXT,
    poster_url TEXT,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    UNIQUE(user_id, title, year)
);

CREATE TABLE IF NOT EXISTS reviews (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    movie_id INTEGER NOT NULL REFERENCES movies(id) ON DELETE CASCADE,
    content TEXT NOT NULL,
    reviewer_rating INTEGER,
    likes INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS trivia_scores (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    movie_id INTEGER REFERENCES movies(id) ON DELETE SET NULL,
    trivia_type TEXT NOT NULL,
    score INTEGER NOT NULL,
    total_questions INTEGER NOT NULL,
    percentage INTEGER NOT NULL,
    completion_time REAL,
    created_at TEXT NOT NULL
);
"#;

// Three-key ranking contract shared by every leaderboard scope: better
// percentage first, then raw score, then earlier submission on full ties.
const LEADERBOARD_ORDER: &str = "ORDER BY s.percentage DESC, s.score DESC, s.created_at ASC";

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(path: &str) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| AppError::database("opening database", e))?;

        let store = Self { pool };
        store.init_schema().await?;
        info!("Database ready at {}", path);
        Ok(store)
    }

    #[cfg(test)]
    pub async fn connect_in_memory() -> Result<Self, AppError> {
        let options = SqliteConnectOptions::new()
            .in_memory(true)
            .foreign_keys(true);

        // A shared pool would hand every connection its own empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| AppError::database("opening database", e))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), AppError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database("initializing schema", e))?;
        Ok(())
    }

    // ---- users ----

    pub async fn add_user(&self, name: &str, email: &str) -> Result<User, AppError> {
        sqlx::query_as::<_, User>(
            "INSERT INTO users (name, email) VALUES (?, ?) RETURNING id, name, email",
        )
        .bind(name)
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::validation("email", "Email already exists")
            } else {
                AppError::database("creating user", e)
            }
        })
    }

    pub async fn get_user(&self, user_id: i64) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, User>("SELECT id, name, email FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::database("fetching user", e))
    }

    pub async fn get_all_users(&self) -> Result<Vec<User>, AppError> {
        sqlx::query_as::<_, User>("SELECT id, name, email FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::database("fetching users", e))
    }

    pub async fn delete_user(&self, user_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database("deleting user", e))?;
        Ok(result.rows_affected() > 0)
    }

    // ---- movies ----

    pub async fn add_movie(&self, user_id: i64, movie: &NewMovie) -> Result<Movie, AppError> {
        sqlx::query_as::<_, Movie>(
            "INSERT INTO movies (title, director, year, rating, genre, poster_url, user_id) \
             VALUES (?, ?, ?, ?, ?, ?, ?) \
             RETURNING id, title, director, year, rating, genre, poster_url, user_id",
        )
        .bind(&movie.title)
        .bind(&movie.director)
        .bind(movie.year)
        .bind(movie.rating)
        .bind(&movie.genre)
        .bind(&movie.poster_url)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::DuplicateMovie {
                    user_id,
                    title: movie.title.clone(),
                    year: movie.year,
                }
            } else {
                AppError::database("creating movie", e)
            }
        })
    }

    pub async fn get_movie(&self, movie_id: i64) -> Result<Option<Movie>, AppError> {
        sqlx::query_as::<_, Movie>(
            "SELECT id, title, director, year, rating, genre, poster_url, user_id \
             FROM movies WHERE id = ?",
        )
        .bind(movie_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database("fetching movie", e))
    }

    pub async fn get_user_movies(&self, user_id: i64) -> Result<Vec<Movie>, AppError> {
        sqlx::query_as::<_, Movie>(
            "SELECT id, title, director, year, rating, genre, poster_url, user_id \
             FROM movies WHERE user_id = ? ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database("fetching user movies", e))
    }

    pub async fn update_movie(
        &self,
        movie_id: i64,
        movie: &NewMovie,
    ) -> Result<Option<Movie>, AppError> {
        let current = match self.get_movie(movie_id).await? {
            Some(current) => current,
            None => return Ok(None),
        };

        sqlx::query_as::<_, Movie>(
            "UPDATE movies SET title = ?, director = ?, year = ?, rating = ?, genre = ?, poster_url = ? \
             WHERE id = ? \
             RETURNING id, title, director, year, rating, genre, poster_url, user_id",
        )
        .bind(&movie.title)
        .bind(&movie.director)
        .bind(movie.year)
        .bind(movie.rating)
        .bind(&movie.genre)
        .bind(&movie.poster_url)
        .bind(movie_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::DuplicateMovie {
                    user_id: current.user_id,
                    title: movie.title.clone(),
                    year: movie.year,
                }
            } else {
                AppError::database("updating movie", e)
            }
        })
    }

    pub async fn delete_movie(&self, movie_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM movies WHERE id = ?")
            .bind(movie_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database("deleting movie", e))?;
        Ok(result.rows_affected() > 0)
    }

    // ---- reviews ----

    pub async fn add_review(
        &self,
        movie_id: i64,
        content: &str,
        reviewer_rating: Option<i64>,
    ) -> Result<Review, AppError> {
        let now = Utc::now();
        sqlx::query_as::<_, Review>(
            "INSERT INTO reviews (movie_id, content, reviewer_rating, likes, created_at, updated_at) \
             VALUES (?, ?, ?, 0, ?, ?) \
             RETURNING id, movie_id, content, reviewer_rating, likes, created_at, updated_at",
        )
        .bind(movie_id)
        .bind(content)
        .bind(reviewer_rating)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                AppError::MovieNotFound(movie_id)
            } else {
                AppError::database("creating review", e)
            }
        })
    }

    pub async fn get_movie_reviews(&self, movie_id: i64) -> Result<Vec<Review>, AppError> {
        sqlx::query_as::<_, Review>(
            "SELECT id, movie_id, content, reviewer_rating, likes, created_at, updated_at \
             FROM reviews WHERE movie_id = ? ORDER BY created_at DESC",
        )
        .bind(movie_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database("fetching reviews", e))
    }

    pub async fn get_review(&self, review_id: i64) -> Result<Option<Review>, AppError> {
        sqlx::query_as::<_, Review>(
            "SELECT id, movie_id, content, reviewer_rating, likes, created_at, updated_at \
             FROM reviews WHERE id = ?",
        )
        .bind(review_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database("fetching review", e))
    }

    pub async fn update_review(
        &self,
        review_id: i64,
        content: &str,
        reviewer_rating: Option<i64>,
    ) -> Result<Option<Review>, AppError> {
        sqlx::query_as::<_, Review>(
            "UPDATE reviews SET content = ?, reviewer_rating = ?, updated_at = ? \
             WHERE id = ? \
             RETURNING id, movie_id, content, reviewer_rating, likes, created_at, updated_at",
        )
        .bind(content)
        .bind(reviewer_rating)
        .bind(Utc::now())
        .bind(review_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database("updating review", e))
    }

    pub async fn delete_review(&self, review_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = ?")
            .bind(review_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database("deleting review", e))?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn like_review(&self, review_id: i64) -> Result<Option<Review>, AppError> {
        sqlx::query_as::<_, Review>(
            "UPDATE reviews SET likes = likes + 1, updated_at = ? \
             WHERE id = ? \
             RETURNING id, movie_id, content, reviewer_rating, likes, created_at, updated_at",
        )
        .bind(Utc::now())
        .bind(review_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database("liking review", e))
    }

    // ---- trivia scores ----

    pub async fn insert_trivia_score(
        &self,
        score: &NewTriviaScore,
    ) -> Result<TriviaScore, AppError> {
        self.insert_trivia_score_at(score, Utc::now()).await
    }

    pub(crate) async fn insert_trivia_score_at(
        &self,
        score: &NewTriviaScore,
        created_at: DateTime<Utc>,
    ) -> Result<TriviaScore, AppError> {
        sqlx::query_as::<_, TriviaScore>(
            "INSERT INTO trivia_scores \
             (user_id, movie_id, trivia_type, score, total_questions, percentage, completion_time, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             RETURNING id, user_id, movie_id, trivia_type, score, total_questions, percentage, \
                       completion_time, created_at",
        )
        .bind(score.user_id)
        .bind(score.movie_id)
        .bind(score.trivia_type)
        .bind(score.score)
        .bind(score.total_questions)
        .bind(score.percentage)
        .bind(score.completion_time)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::database("saving trivia score", e))
    }

    pub async fn global_leaderboard(&self, limit: i64) -> Result<Vec<LeaderboardEntry>, AppError> {
        let sql = format!(
            "SELECT s.user_id, u.name AS user_name, s.movie_id, m.title AS movie_title, \
                    s.trivia_type, s.score, s.total_questions, s.percentage, s.created_at \
             FROM trivia_scores s \
             JOIN users u ON u.id = s.user_id \
             LEFT JOIN movies m ON m.id = s.movie_id \
             {} LIMIT ?",
            LEADERBOARD_ORDER
        );
        sqlx::query_as::<_, LeaderboardEntry>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::database("fetching global leaderboard", e))
    }

    pub async fn movie_leaderboard(
        &self,
        movie_id: i64,
        limit: i64,
    ) -> Result<Vec<LeaderboardEntry>, AppError> {
        let sql = format!(
            "SELECT s.user_id, u.name AS user_name, s.movie_id, m.title AS movie_title, \
                    s.trivia_type, s.score, s.total_questions, s.percentage, s.created_at \
             FROM trivia_scores s \
             JOIN users u ON u.id = s.user_id \
             LEFT JOIN movies m ON m.id = s.movie_id \
             WHERE s.movie_id = ? \
             {} LIMIT ?",
            LEADERBOARD_ORDER
        );
        sqlx::query_as::<_, LeaderboardEntry>(&sql)
            .bind(movie_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::database("fetching movie leaderboard", e))
    }

    pub async fn collection_leaderboard(
        &self,
        limit: i64,
    ) -> Result<Vec<LeaderboardEntry>, AppError> {
        let sql = format!(
            "SELECT s.user_id, u.name AS user_name, s.movie_id, m.title AS movie_title, \
                    s.trivia_type, s.score, s.total_questions, s.percentage, s.created_at \
             FROM trivia_scores s \
             JOIN users u ON u.id = s.user_id \
             LEFT JOIN movies m ON m.id = s.movie_id \
             WHERE s.trivia_type = ? \
             {} LIMIT ?",
            LEADERBOARD_ORDER
        );
        sqlx::query_as::<_, LeaderboardEntry>(&sql)
            .bind(TriviaType::Collection)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::database("fetching collection leaderboard", e))
    }

    pub async fn user_trivia_stats(
        &self,
        user_id: i64,
        recent_limit: i64,
    ) -> Result<UserTriviaStats, AppError> {
        let (total, best, average, movie_attempts, collection_attempts): (
            i64,
            Option<i64>,
            Option<f64>,
            Option<i64>,
            Option<i64>,
        ) = sqlx::query_as(
            "SELECT COUNT(*), MAX(percentage), AVG(percentage), \
                    SUM(CASE WHEN trivia_type = 'movie' THEN 1 ELSE 0 END), \
                    SUM(CASE WHEN trivia_type = 'collection' THEN 1 ELSE 0 END) \
             FROM trivia_scores WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::database("fetching user trivia stats", e))?;

        let recent_scores = sqlx::query_as::<_, TriviaScore>(
            "SELECT id, user_id, movie_id, trivia_type, score, total_questions, percentage, \
                    completion_time, created_at \
             FROM trivia_scores WHERE user_id = ? \
             ORDER BY created_at DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(recent_limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database("fetching recent trivia scores", e))?;

        Ok(UserTriviaStats {
            total_attempts: total,
            best_percentage: best.unwrap_or(0),
            average_percentage: average.map(|a| a.round() as i64).unwrap_or(0),
            movie_attempts: movie_attempts.unwrap_or(0),
            collection_attempts: collection_attempts.unwrap_or(0),
            recent_scores,
        })
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.kind() == ErrorKind::UniqueViolation)
}

fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.kind() == ErrorKind::ForeignKeyViolation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    async fn store_with_user() -> (SqliteStore, User) {
        let store = SqliteStore::connect_in_memory().await.unwrap();
        let user = store.add_user("Alice", "alice@example.com").await.unwrap();
        (store, user)
    }

    fn movie(title: &str, year: i32) -> NewMovie {
        NewMovie {
            title: title.to_string(),
            year: Some(year),
            ..NewMovie::default()
        }
    }

    fn score_row(user_id: i64, trivia_type: TriviaType, score: i64, percentage: i64) -> NewTriviaScore {
        NewTriviaScore {
            user_id,
            movie_id: None,
            trivia_type,
            score,
            total_questions: 10,
            percentage,
            completion_time: None,
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_a_validation_error() {
        let (store, _user) = store_with_user().await;
        let err = store.add_user("Other", "alice@example.com").await.unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "email"));
    }

    #[tokio::test]
    async fn duplicate_title_year_per_user_is_rejected() {
        let (store, user) = store_with_user().await;
        store.add_movie(user.id, &movie("Heat", 1995)).await.unwrap();

        let err = store.add_movie(user.id, &movie("Heat", 1995)).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateMovie { .. }));

        // Same title and year under a different user is fine.
        let other = store.add_user("Bob", "bob@example.com").await.unwrap();
        store.add_movie(other.id, &movie("Heat", 1995)).await.unwrap();
    }

    #[tokio::test]
    async fn deleting_user_cascades_to_movies_and_reviews() {
        let (store, user) = store_with_user().await;
        let m = store.add_movie(user.id, &movie("Alien", 1979)).await.unwrap();
        store.add_review(m.id, "A classic.", Some(9)).await.unwrap();

        assert!(store.delete_user(user.id).await.unwrap());
        assert!(store.get_movie(m.id).await.unwrap().is_none());
        assert!(store.get_movie_reviews(m.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_movie_keeps_score_history() {
        let (store, user) = store_with_user().await;
        let m = store.add_movie(user.id, &movie("Alien", 1979)).await.unwrap();

        let mut row = score_row(user.id, TriviaType::Movie, 7, 70);
        row.movie_id = Some(m.id);
        let saved = store.insert_trivia_score(&row).await.unwrap();
        assert_eq!(saved.movie_id, Some(m.id));

        assert!(store.delete_movie(m.id).await.unwrap());
        let board = store.global_leaderboard(20).await.unwrap();
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].movie_id, None);
    }

    #[tokio::test]
    async fn review_for_missing_movie_is_not_found() {
        let (store, _user) = store_with_user().await;
        let err = store.add_review(999, "ghost", None).await.unwrap_err();
        assert!(matches!(err, AppError::MovieNotFound(999)));
    }

    #[tokio::test]
    async fn liking_a_review_increments_monotonically() {
        let (store, user) = store_with_user().await;
        let m = store.add_movie(user.id, &movie("Alien", 1979)).await.unwrap();
        let review = store.add_review(m.id, "Great.", None).await.unwrap();
        assert_eq!(review.likes, 0);

        store.like_review(review.id).await.unwrap();
        let liked = store.like_review(review.id).await.unwrap().unwrap();
        assert_eq!(liked.likes, 2);
    }

    #[tokio::test]
    async fn leaderboard_orders_by_percentage_score_then_time() {
        let (store, user) = store_with_user().await;
        let other = store.add_user("Bob", "bob@example.com").await.unwrap();

        let t = |h: u32| Utc.with_ymd_and_hms(2024, 5, 1, h, 0, 0).unwrap();

        // Equal percentage and score: earlier submission wins the tie.
        store
            .insert_trivia_score_at(&score_row(other.id, TriviaType::Movie, 8, 80), t(2))
            .await
            .unwrap();
        store
            .insert_trivia_score_at(&score_row(user.id, TriviaType::Movie, 8, 80), t(1))
            .await
            .unwrap();
        // Higher percentage outranks both.
        store
            .insert_trivia_score_at(&score_row(user.id, TriviaType::Movie, 9, 90), t(3))
            .await
            .unwrap();
        // Equal percentage, higher raw score outranks lower.
        store
            .insert_trivia_score_at(&score_row(other.id, TriviaType::Collection, 16, 80), t(4))
            .await
            .unwrap();

        let board = store.global_leaderboard(20).await.unwrap();
        let ranked: Vec<(i64, i64, i64)> = board
            .iter()
            .map(|e| (e.percentage, e.score, e.user_id))
            .collect();
        assert_eq!(
            ranked,
            vec![
                (90, 9, user.id),
                (80, 16, other.id),
                (80, 8, user.id),
                (80, 8, other.id),
            ]
        );
    }

    #[tokio::test]
    async fn collection_leaderboard_filters_by_type() {
        let (store, user) = store_with_user().await;
        store
            .insert_trivia_score(&score_row(user.id, TriviaType::Movie, 7, 70))
            .await
            .unwrap();
        store
            .insert_trivia_score(&score_row(user.id, TriviaType::Collection, 15, 71))
            .await
            .unwrap();

        let board = store.collection_leaderboard(20).await.unwrap();
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].trivia_type, TriviaType::Collection);
    }

    #[tokio::test]
    async fn movie_leaderboard_scopes_to_one_movie() {
        let (store, user) = store_with_user().await;
        let m1 = store.add_movie(user.id, &movie("Alien", 1979)).await.unwrap();
        let m2 = store.add_movie(user.id, &movie("Aliens", 1986)).await.unwrap();

        for (mid, pct) in [(m1.id, 50), (m2.id, 60), (m1.id, 90)] {
            let mut row = score_row(user.id, TriviaType::Movie, 5, pct);
            row.movie_id = Some(mid);
            store.insert_trivia_score(&row).await.unwrap();
        }

        let board = store.movie_leaderboard(m1.id, 15).await.unwrap();
        assert_eq!(board.len(), 2);
        assert_eq!(board[0].percentage, 90);
        assert_eq!(board[0].movie_title.as_deref(), Some("Alien"));
    }

    #[tokio::test]
    async fn user_stats_aggregate_and_zero_shape() {
        let (store, user) = store_with_user().await;

        // No scores yet: defined all-zero structure, not an error.
        let empty = store.user_trivia_stats(user.id, 5).await.unwrap();
        assert_eq!(empty.total_attempts, 0);
        assert_eq!(empty.best_percentage, 0);
        assert_eq!(empty.average_percentage, 0);
        assert!(empty.recent_scores.is_empty());

        let t = |h: u32| Utc.with_ymd_and_hms(2024, 5, 1, h, 0, 0).unwrap();
        store
            .insert_trivia_score_at(&score_row(user.id, TriviaType::Movie, 7, 70), t(1))
            .await
            .unwrap();
        store
            .insert_trivia_score_at(&score_row(user.id, TriviaType::Collection, 17, 81), t(2))
            .await
            .unwrap();

        let stats = store.user_trivia_stats(user.id, 1).await.unwrap();
        assert_eq!(stats.total_attempts, 2);
        assert_eq!(stats.best_percentage, 81);
        // AVG(70, 81) = 75.5, rounded.
        assert_eq!(stats.average_percentage, 76);
        assert_eq!(stats.movie_attempts, 1);
        assert_eq!(stats.collection_attempts, 1);
        // Most recent first, clipped to the limit.
        assert_eq!(stats.recent_scores.len(), 1);
        assert_eq!(stats.recent_scores[0].percentage, 81);
    }
}
