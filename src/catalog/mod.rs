use crate::error::AppError;
use crate::models::{Movie, NewMovie, Review, User};
use crate::omdb::OmdbClient;
use crate::store::SqliteStore;
use regex::Regex;
use std::sync::OnceLock;
use tracing::{info, warn};

pub const USER_NAME_MAX: usize = 100;
pub const USER_EMAIL_MAX: usize = 120;
pub const MOVIE_TITLE_MAX: usize = 200;
pub const DIRECTOR_NAME_MAX: usize = 100;
pub const GENRE_MAX: usize = 100;
pub const REVIEW_CONTENT_MAX: usize = 2000;
pub const RATING_MIN: f64 = 1.0;
pub const RATING_MAX: f64 = 10.0;
pub const YEAR_MIN: i32 = 1800;
pub const YEAR_MAX: i32 = 2050;

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid regex")
    })
}

/// Business logic over the catalog tables: validation, duplicate checks and
/// best-effort metadata enrichment before anything touches the store.
pub struct CatalogService {
    store: SqliteStore,
    omdb: Option<OmdbClient>,
}

impl CatalogService {
    pub fn new(store: SqliteStore, omdb: Option<OmdbClient>) -> Self {
        Self { store, omdb }
    }

    // ---- users ----

    pub async fn create_user(&self, name: &str, email: &str) -> Result<User, AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::validation("name", "Name is required"));
        }
        if name.len() > USER_NAME_MAX {
            return Err(AppError::validation(
                "name",
                format!("Name must be at most {} characters", USER_NAME_MAX),
            ));
        }

        let email = validate_email(email)?;
        let user = self.store.add_user(name, &email).await?;
        info!(user_id = user.id, "Created user");
        Ok(user)
    }

    pub async fn get_user(&self, user_id: i64) -> Result<User, AppError> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or(AppError::UserNotFound(user_id))
    }

    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        self.store.get_all_users().await
    }

    pub async fn delete_user(&self, user_id: i64) -> Result<(), AppError> {
        if !self.store.delete_user(user_id).await? {
            return Err(AppError::UserNotFound(user_id));
        }
        Ok(())
    }

    // ---- movies ----

    pub async fn create_movie_for_user(
        &self,
        user_id: i64,
        movie: NewMovie,
    ) -> Result<Movie, AppError> {
        self.get_user(user_id).await?;
        let mut movie = validate_movie(movie)?;

        if let Some(ref omdb) = self.omdb {
            omdb.enhance(&mut movie).await;
        }

        // Pre-check gives a friendly error; the UNIQUE constraint in the
        // store closes the race a concurrent insert could win.
        self.check_duplicate(user_id, &movie, None).await?;

        let created = self.store.add_movie(user_id, &movie).await?;
        info!(movie_id = created.id, user_id, title = %created.title, "Added movie");
        Ok(created)
    }

    pub async fn get_movie(&self, movie_id: i64) -> Result<Movie, AppError> {
        self.store
            .get_movie(movie_id)
            .await?
            .ok_or(AppError::MovieNotFound(movie_id))
    }

    pub async fn get_movie_for_user(&self, user_id: i64, movie_id: i64) -> Result<Movie, AppError> {
        let movie = self.get_movie(movie_id).await?;
        if movie.user_id != user_id {
            return Err(AppError::MovieNotFound(movie_id));
        }
        Ok(movie)
    }

    pub async fn list_user_movies(&self, user_id: i64) -> Result<Vec<Movie>, AppError> {
        self.get_user(user_id).await?;
        self.store.get_user_movies(user_id).await
    }

    pub async fn update_movie(&self, movie_id: i64, movie: NewMovie) -> Result<Movie, AppError> {
        let movie = validate_movie(movie)?;
        let current = self.get_movie(movie_id).await?;

        self.check_duplicate(current.user_id, &movie, Some(movie_id))
            .await?;

        self.store
            .update_movie(movie_id, &movie)
            .await?
            .ok_or(AppError::MovieNotFound(movie_id))
    }

    pub async fn delete_movie(&self, movie_id: i64) -> Result<(), AppError> {
        if !self.store.delete_movie(movie_id).await? {
            return Err(AppError::MovieNotFound(movie_id));
        }
        Ok(())
    }

    async fn check_duplicate(
        &self,
        user_id: i64,
        movie: &NewMovie,
        skip_movie_id: Option<i64>,
    ) -> Result<(), AppError> {
        let title = movie.title.to_lowercase();
        let existing = self.store.get_user_movies(user_id).await?;

        for other in existing {
            if Some(other.id) == skip_movie_id {
                continue;
            }
            if other.title.to_lowercase() == title && other.year == movie.year {
                return Err(AppError::DuplicateMovie {
                    user_id,
                    title: movie.title.clone(),
                    year: movie.year,
                });
            }
        }
        Ok(())
    }

    // ---- reviews ----

    pub async fn create_review(
        &self,
        movie_id: i64,
        content: &str,
        reviewer_rating: Option<i64>,
    ) -> Result<Review, AppError> {
        let content = validate_review(content, reviewer_rating)?;
        self.store
            .add_review(movie_id, &content, reviewer_rating)
            .await
    }

    pub async fn list_movie_reviews(&self, movie_id: i64) -> Result<Vec<Review>, AppError> {
        self.get_movie(movie_id).await?;
        self.store.get_movie_reviews(movie_id).await
    }

    pub async fn update_review(
        &self,
        review_id: i64,
        content: &str,
        reviewer_rating: Option<i64>,
    ) -> Result<Review, AppError> {
        let content = validate_review(content, reviewer_rating)?;
        self.store
            .update_review(review_id, &content, reviewer_rating)
            .await?
            .ok_or(AppError::ReviewNotFound(review_id))
    }

    pub async fn delete_review(&self, review_id: i64) -> Result<(), AppError> {
        if !self.store.delete_review(review_id).await? {
            return Err(AppError::ReviewNotFound(review_id));
        }
        Ok(())
    }

    pub async fn like_review(&self, review_id: i64) -> Result<Review, AppError> {
        self.store
            .like_review(review_id)
            .await?
            .ok_or(AppError::ReviewNotFound(review_id))
    }
}

fn validate_email(email: &str) -> Result<String, AppError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(AppError::validation("email", "Email is required"));
    }
    if email.len() > USER_EMAIL_MAX {
        return Err(AppError::validation(
            "email",
            format!("Email must be at most {} characters", USER_EMAIL_MAX),
        ));
    }
    if !email_pattern().is_match(&email) {
        return Err(AppError::validation("email", "Invalid email format"));
    }
    Ok(email)
}

fn validate_movie(movie: NewMovie) -> Result<NewMovie, AppError> {
    let NewMovie {
        title,
        director,
        year,
        rating,
        genre,
        poster_url,
    } = movie;

    let title = title.trim().to_string();
    if title.is_empty() {
        return Err(AppError::validation("title", "Movie title is required"));
    }
    if title.len() > MOVIE_TITLE_MAX {
        return Err(AppError::validation(
            "title",
            format!("Title must be at most {} characters", MOVIE_TITLE_MAX),
        ));
    }

    if let Some(year) = year {
        if !(YEAR_MIN..=YEAR_MAX).contains(&year) {
            return Err(AppError::validation(
                "year",
                format!("Year must be between {} and {}", YEAR_MIN, YEAR_MAX),
            ));
        }
    }

    if let Some(rating) = rating {
        if !(RATING_MIN..=RATING_MAX).contains(&rating) {
            return Err(AppError::validation("rating", "Rating must be between 1 and 10"));
        }
    }

    let director = normalize_optional(director, "director", DIRECTOR_NAME_MAX)?;
    let genre = normalize_optional(genre, "genre", GENRE_MAX)?;

    Ok(NewMovie {
        title,
        director,
        year,
        rating,
        genre,
        poster_url,
    })
}

fn normalize_optional(
    value: Option<String>,
    field: &str,
    max: usize,
) -> Result<Option<String>, AppError> {
    match value.map(|v| v.trim().to_string()) {
        None => Ok(None),
        Some(v) if v.is_empty() => Ok(None),
        Some(v) if v.len() > max => Err(AppError::validation(
            field,
            format!("{} must be at most {} characters", field, max),
        )),
        Some(v) => Ok(Some(v)),
    }
}

fn validate_review(content: &str, reviewer_rating: Option<i64>) -> Result<String, AppError> {
    let content = content.trim().to_string();
    if content.is_empty() {
        return Err(AppError::validation("content", "Review content is required"));
    }
    if content.len() > REVIEW_CONTENT_MAX {
        return Err(AppError::validation(
            "content",
            format!("Review must be at most {} characters", REVIEW_CONTENT_MAX),
        ));
    }
    if let Some(rating) = reviewer_rating {
        if !(1..=10).contains(&rating) {
            warn!(rating, "Rejecting out-of-range reviewer rating");
            return Err(AppError::validation(
                "reviewer_rating",
                "Rating must be between 1 and 10",
            ));
        }
    }
    Ok(content)
}
