use crate::models::TriviaType;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("User with ID {0} not found")]
    UserNotFound(i64),

    #[error("Movie with ID {0} not found")]
    MovieNotFound(i64),

    #[error("Review with ID {0} not found")]
    ReviewNotFound(i64),

    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Movie '{title}' ({year:?}) already exists for user {user_id}")]
    DuplicateMovie {
        user_id: i64,
        title: String,
        year: Option<i32>,
    },

    #[error(
        "User {user_id} has only {movie_count} movies, but {required_count} required for collection trivia"
    )]
    InsufficientMovies {
        user_id: i64,
        movie_count: usize,
        required_count: usize,
    },

    #[error("Both trivia providers failed to generate {trivia_type} trivia questions")]
    TriviaGeneration { trivia_type: TriviaType },

    #[error("Database error during {operation}")]
    Database {
        operation: String,
        #[source]
        source: sqlx::Error,
    },
}

impl AppError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn database(operation: &str, source: sqlx::Error) -> Self {
        AppError::Database {
            operation: operation.to_string(),
            source,
        }
    }

    // Status-code equivalents for an HTTP surface in front of this core.
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::UserNotFound(_) | AppError::MovieNotFound(_) | AppError::ReviewNotFound(_) => 404,
            AppError::Validation { .. } | AppError::InsufficientMovies { .. } => 400,
            AppError::DuplicateMovie { .. } => 409,
            AppError::TriviaGeneration { .. } => 503,
            AppError::Database { .. } => 500,
        }
    }
}

/// Failure channel for question providers. These never escape the provider
/// boundary as application errors; the orchestrator logs them and moves on
/// to the next provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("monthly API quota exhausted")]
    QuotaExhausted,

    #[error("no API key configured")]
    MissingApiKey,

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),

    #[error("service temporarily unavailable")]
    Unavailable,

    #[error("no valid question set in response")]
    MalformedResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_error_classes() {
        assert_eq!(AppError::UserNotFound(1).status_code(), 404);
        assert_eq!(AppError::validation("year", "out of range").status_code(), 400);
        assert_eq!(
            AppError::DuplicateMovie {
                user_id: 1,
                title: "Heat".to_string(),
                year: Some(1995),
            }
            .status_code(),
            409
        );
        assert_eq!(
            AppError::InsufficientMovies {
                user_id: 1,
                movie_count: 2,
                required_count: 3,
            }
            .status_code(),
            400
        );
        assert_eq!(
            AppError::TriviaGeneration {
                trivia_type: TriviaType::Movie,
            }
            .status_code(),
            503
        );
    }

    #[test]
    fn insufficient_movies_reports_counts() {
        let err = AppError::InsufficientMovies {
            user_id: 7,
            movie_count: 2,
            required_count: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("only 2 movies"));
        assert!(msg.contains("3 required"));
    }
}
