use crate::config::OpenAiConfig;
use crate::error::ProviderError;
use crate::http::HttpClient;
use crate::models::{ApiSource, Movie, QuestionSet};
use crate::rapidapi::{describe_movie, list_movies};
use crate::trivia::QuestionProvider;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument, warn};

const SYSTEM_PROMPT: &str = "You are a movie trivia expert. You only respond with valid JSON \
                             containing trivia questions. Never include any text outside of \
                             the JSON structure.";

/// Secondary trivia provider, reached when the primary yields nothing.
/// Not quota-gated; only the primary is budget-limited.
pub struct OpenAiClient {
    http: HttpClient,
    config: OpenAiConfig,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(http: HttpClient, config: OpenAiConfig) -> Self {
        Self { http, config }
    }

    #[instrument(skip(self, prompt))]
    async fn ask(&self, prompt: &str, max_tokens: u32) -> Result<QuestionSet, ProviderError> {
        let Some(api_key) = self.config.api_key() else {
            warn!("No OpenAI API key configured");
            return Err(ProviderError::MissingApiKey);
        };

        let payload = json!({
            "model": self.config.model(),
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
            "max_tokens": max_tokens,
            "temperature": 0.7,
        });

        debug!("Requesting trivia questions from OpenAI");
        let response = self
            .http
            .request(reqwest::Method::POST, &self.config.base_url())
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        match status {
            StatusCode::OK => {}
            StatusCode::TOO_MANY_REQUESTS => {
                warn!("OpenAI API rate limit exceeded");
                return Err(ProviderError::Status(status));
            }
            StatusCode::UNAUTHORIZED => {
                warn!("OpenAI API authentication failed, check the API key");
                return Err(ProviderError::Status(status));
            }
            other => {
                warn!("OpenAI API request failed with status {}", other);
                return Err(ProviderError::Status(other));
            }
        }

        let data: ChatCompletionResponse = response.json().await?;
        let content = data
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or(ProviderError::MalformedResponse)?;

        QuestionSet::extract(&content).ok_or(ProviderError::MalformedResponse)
    }
}

#[async_trait]
impl QuestionProvider for OpenAiClient {
    fn source(&self) -> ApiSource {
        ApiSource::OpenAi
    }

    async fn movie_questions(
        &self,
        movie: &Movie,
        count: usize,
    ) -> Result<QuestionSet, ProviderError> {
        let prompt = format!(
            "Generate exactly {} trivia questions about the movie {}.\n\n\
             Create questions about plot details, character interactions, memorable quotes \
             and behind-the-scenes facts. Mix difficulty levels from medium up to the \
             highest difficulty possible.",
            count,
            describe_movie(movie)
        );
        self.ask(&prompt, 2000).await
    }

    async fn collection_questions(
        &self,
        movies: &[Movie],
        count: usize,
    ) -> Result<QuestionSet, ProviderError> {
        let prompt = format!(
            "Generate exactly {} trivia questions about these movies: {}.\n\n\
             Create comparative questions across movies, director questions and challenging \
             trivia that tests knowledge of the entire collection. Mix easy, medium and hard \
             difficulty. Only use movies from the provided collection.",
            count,
            list_movies(movies)
        );
        self.ask(&prompt, 2000).await
    }

    async fn test_connection(&self) -> bool {
        let probe = "Return a JSON object with a \"questions\" array containing one simple \
                     multiple-choice movie question with 4 options, a zero-based \"correct\" \
                     index and a \"difficulty\".";
        self.ask(probe, 300).await.is_ok()
    }
}
