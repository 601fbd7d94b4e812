use crate::config::RapidApiConfig;
use crate::error::ProviderError;
use crate::http::HttpClient;
use crate::models::{ApiSource, Movie, QuestionSet};
use crate::quota::UsageTracker;
use crate::trivia::QuestionProvider;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const UNAVAILABLE_MARKER: &str = "I'm sorry, right now I'm not able to answer that question";

/// Primary trivia provider. Every attempted call is charged against the
/// monthly quota, whether or not it succeeds, so transport failures cannot
/// silently burn the budget through retries.
pub struct RapidApiClient {
    http: HttpClient,
    config: RapidApiConfig,
    tracker: Arc<UsageTracker>,
}

// The ask endpoint usually wraps the model text in a small JSON envelope.
#[derive(Debug, Deserialize)]
struct AskEnvelope {
    response: Option<String>,
    message: Option<String>,
}

impl RapidApiClient {
    pub fn new(http: HttpClient, config: RapidApiConfig, tracker: Arc<UsageTracker>) -> Self {
        Self {
            http,
            config,
            tracker,
        }
    }

    #[instrument(skip(self, query))]
    async fn ask(&self, query: &str) -> Result<QuestionSet, ProviderError> {
        let Some(api_key) = self.config.api_key() else {
            warn!("No RapidAPI key configured");
            return Err(ProviderError::MissingApiKey);
        };

        if !self.tracker.can_make_call() {
            info!("Monthly API limit reached, blocking RapidAPI call");
            return Err(ProviderError::QuotaExhausted);
        }

        debug!("Requesting trivia questions from RapidAPI");
        let send_result = self
            .http
            .request(reqwest::Method::POST, &self.config.base_url())
            .header("x-rapidapi-key", &api_key)
            .header("x-rapidapi-host", self.config.host())
            .json(&json!({ "query": query }))
            .send()
            .await;

        // Charged once per attempt, success or failure.
        self.tracker.record_call();

        let response = send_result?;
        let status = response.status();
        if !status.is_success() {
            warn!("RapidAPI request failed with status {}", status);
            return Err(ProviderError::Status(status));
        }

        let body = response.text().await?;
        if body.contains(UNAVAILABLE_MARKER) {
            warn!("RapidAPI ChatGPT service temporarily unavailable");
            return Err(ProviderError::Unavailable);
        }

        let text = serde_json::from_str::<AskEnvelope>(&body)
            .ok()
            .and_then(|envelope| envelope.response.or(envelope.message))
            .unwrap_or(body);

        QuestionSet::extract(&text).ok_or(ProviderError::MalformedResponse)
    }
}

#[async_trait]
impl QuestionProvider for RapidApiClient {
    fn source(&self) -> ApiSource {
        ApiSource::RapidApi
    }

    async fn movie_questions(
        &self,
        movie: &Movie,
        count: usize,
    ) -> Result<QuestionSet, ProviderError> {
        self.ask(&build_movie_query(movie, count)).await
    }

    async fn collection_questions(
        &self,
        movies: &[Movie],
        count: usize,
    ) -> Result<QuestionSet, ProviderError> {
        self.ask(&build_collection_query(movies, count)).await
    }

    async fn test_connection(&self) -> bool {
        let probe = "Return a JSON object with a \"questions\" array containing one \
                     multiple-choice movie question with 4 options, a zero-based \"correct\" \
                     index and a \"difficulty\". JSON only.";
        self.ask(probe).await.is_ok()
    }
}

pub(crate) fn describe_movie(movie: &Movie) -> String {
    let mut details = Vec::new();
    if let Some(ref director) = movie.director {
        details.push(format!("Director: {}", director));
    }
    if let Some(ref genre) = movie.genre {
        details.push(format!("Genre: {}", genre));
    }
    let details = if details.is_empty() {
        "Unknown details".to_string()
    } else {
        details.join(", ")
    };

    let year = movie
        .year
        .map(|y| y.to_string())
        .unwrap_or_else(|| "Unknown".to_string());

    format!("\"{} ({})\". {}", movie.title, year, details)
}

pub(crate) fn list_movies(movies: &[Movie]) -> String {
    // Cap the prompt at ten titles to keep the request focused.
    movies
        .iter()
        .take(10)
        .map(|m| {
            format!(
                "{} ({}) directed by {}",
                m.title,
                m.year.map(|y| y.to_string()).unwrap_or_else(|| "Unknown".to_string()),
                m.director.as_deref().unwrap_or("Unknown")
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

const FORMAT_INSTRUCTION: &str = r#"Return ONLY valid JSON in this exact format, no extra text before or after:
{"questions": [{"question": "...", "options": ["...", "...", "...", "..."], "correct": 0, "difficulty": "easy"}]}"#;

fn build_movie_query(movie: &Movie, count: usize) -> String {
    format!(
        "Generate exactly {} trivia questions about the movie {}.\n\n{}\n\n\
         Ask about plot details, characters, memorable quotes and behind-the-scenes facts \
         that only true fans would know. Mix difficulty levels from medium up to the \
         highest difficulty possible.",
        count,
        describe_movie(movie),
        FORMAT_INSTRUCTION
    )
}

fn build_collection_query(movies: &[Movie], count: usize) -> String {
    format!(
        "Generate exactly {} trivia questions about these movies: {}.\n\n{}\n\n\
         Use comparative questions (which movie was released first?), director questions \
         and specific facts. Mix easy, medium and hard difficulty. Only use movies from \
         the provided collection.",
        count,
        list_movies(movies),
        FORMAT_INSTRUCTION
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movie(title: &str, year: Option<i32>, director: Option<&str>) -> Movie {
        Movie {
            id: 1,
            title: title.to_string(),
            director: director.map(|d| d.to_string()),
            year,
            rating: None,
            genre: None,
            poster_url: None,
            user_id: 1,
        }
    }

    #[test]
    fn movie_query_embeds_facts_and_count() {
        let query = build_movie_query(&movie("Alien", Some(1979), Some("Ridley Scott")), 7);
        assert!(query.contains("exactly 7 trivia questions"));
        assert!(query.contains("Alien (1979)"));
        assert!(query.contains("Director: Ridley Scott"));
        assert!(query.contains("\"questions\""));
    }

    #[test]
    fn movie_description_handles_missing_fields() {
        let described = describe_movie(&movie("Mystery Film", None, None));
        assert!(described.contains("Mystery Film (Unknown)"));
        assert!(described.contains("Unknown details"));
    }

    #[test]
    fn collection_query_caps_at_ten_titles() {
        let movies: Vec<Movie> = (0..15)
            .map(|i| movie(&format!("Movie {}", i), Some(2000 + i), None))
            .collect();
        let listed = list_movies(&movies);
        assert!(listed.contains("Movie 9"));
        assert!(!listed.contains("Movie 10"));
    }
}
