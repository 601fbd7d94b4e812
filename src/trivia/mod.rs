use crate::config::TriviaConfig;
use crate::error::{AppError, ProviderError};
use crate::models::{ApiSource, Movie, Question, QuestionSet, TriviaType};
use crate::store::SqliteStore;
use async_trait::async_trait;
use tracing::{info, warn};

/// One source of multiple-choice questions. Implementations never let a
/// failure escape as anything but a `ProviderError`; deciding what a failure
/// means is the engine's job.
#[async_trait]
pub trait QuestionProvider: Send + Sync {
    fn source(&self) -> ApiSource;

    async fn movie_questions(
        &self,
        movie: &Movie,
        count: usize,
    ) -> Result<QuestionSet, ProviderError>;

    async fn collection_questions(
        &self,
        movies: &[Movie],
        count: usize,
    ) -> Result<QuestionSet, ProviderError>;

    async fn test_connection(&self) -> bool;
}

/// A ready-to-play question set: validated, truncated to the contract count
/// and tagged with the provider that produced it.
#[derive(Debug, Clone)]
pub struct GeneratedTrivia {
    pub trivia_type: TriviaType,
    pub user_id: i64,
    pub movie_id: Option<i64>,
    pub questions: Vec<Question>,
    pub api_used: ApiSource,
}

pub struct TriviaEngine {
    store: SqliteStore,
    providers: Vec<Box<dyn QuestionProvider>>,
    config: TriviaConfig,
}

impl TriviaEngine {
    pub fn new(
        store: SqliteStore,
        providers: Vec<Box<dyn QuestionProvider>>,
        config: TriviaConfig,
    ) -> Self {
        Self {
            store,
            providers,
            config,
        }
    }

    pub async fn generate_movie_trivia(
        &self,
        user_id: i64,
        movie_id: i64,
    ) -> Result<GeneratedTrivia, AppError> {
        self.validate_user(user_id).await?;
        let movie = self.validate_movie(user_id, movie_id).await?;

        let count = self.config.movie_questions();
        let (mut set, api_used) = self
            .try_providers(TriviaType::Movie, Some(&movie), &[], count)
            .await?;
        set.questions.truncate(count);

        Ok(GeneratedTrivia {
            trivia_type: TriviaType::Movie,
            user_id,
            movie_id: Some(movie_id),
            questions: set.questions,
            api_used,
        })
    }

    pub async fn generate_collection_trivia(
        &self,
        user_id: i64,
    ) -> Result<GeneratedTrivia, AppError> {
        self.validate_user(user_id).await?;
        let movies = self.validate_collection_requirements(user_id).await?;

        let count = self.config.collection_questions();
        let (mut set, api_used) = self
            .try_providers(TriviaType::Collection, None, &movies, count)
            .await?;
        set.questions.truncate(count);

        Ok(GeneratedTrivia {
            trivia_type: TriviaType::Collection,
            user_id,
            movie_id: None,
            questions: set.questions,
            api_used,
        })
    }

    pub async fn test_apis(&self) -> Vec<(ApiSource, bool)> {
        let mut results = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            let ok = provider.test_connection().await;
            info!(provider = %provider.source(), ok, "API connection test");
            results.push((provider.source(), ok));
        }
        results
    }

    // Providers are tried in priority order; the first non-empty set wins.
    // An error and an empty set both mean "move on"; only total exhaustion
    // becomes an application error.
    async fn try_providers(
        &self,
        trivia_type: TriviaType,
        movie: Option<&Movie>,
        movies: &[Movie],
        count: usize,
    ) -> Result<(QuestionSet, ApiSource), AppError> {
        for provider in &self.providers {
            let source = provider.source();
            let result = match movie {
                Some(movie) => provider.movie_questions(movie, count).await,
                None => provider.collection_questions(movies, count).await,
            };

            match result {
                Ok(set) if !set.is_empty() => {
                    info!(
                        provider = %source,
                        questions = set.len(),
                        "Trivia generation successful"
                    );
                    return Ok((set, source));
                }
                Ok(_) => {
                    warn!(provider = %source, "Provider returned no valid questions");
                }
                Err(ProviderError::QuotaExhausted) => {
                    info!(provider = %source, "Monthly quota exhausted, trying next provider");
                }
                Err(e) => {
                    warn!(provider = %source, error = %e, "Provider failed, trying next");
                }
            }
        }

        Err(AppError::TriviaGeneration { trivia_type })
    }

    async fn validate_user(&self, user_id: i64) -> Result<(), AppError> {
        self.store
            .get_user(user_id)
            .await?
            .map(|_| ())
            .ok_or(AppError::UserNotFound(user_id))
    }

    async fn validate_movie(&self, user_id: i64, movie_id: i64) -> Result<Movie, AppError> {
        let movie = self
            .store
            .get_movie(movie_id)
            .await?
            .ok_or(AppError::MovieNotFound(movie_id))?;
        if movie.user_id != user_id {
            return Err(AppError::MovieNotFound(movie_id));
        }
        Ok(movie)
    }

    async fn validate_collection_requirements(
        &self,
        user_id: i64,
    ) -> Result<Vec<Movie>, AppError> {
        let movies = self.store.get_user_movies(user_id).await?;
        let required_count = self.config.min_collection_size();

        if movies.len() < required_count {
            return Err(AppError::InsufficientMovies {
                user_id,
                movie_count: movies.len(),
                required_count,
            });
        }
        Ok(movies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewMovie;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    enum Behavior {
        Questions(usize),
        Empty,
        Fail(fn() -> ProviderError),
    }

    struct ScriptedProvider {
        source: ApiSource,
        behavior: Behavior,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedProvider {
        fn new(source: ApiSource, behavior: Behavior) -> (Box<Self>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Box::new(Self {
                    source,
                    behavior,
                    calls: Arc::clone(&calls),
                }),
                calls,
            )
        }

        fn respond(&self) -> Result<QuestionSet, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Questions(n) => Ok(QuestionSet {
                    questions: (0..*n)
                        .map(|i| Question {
                            question: format!("Question {}?", i),
                            options: vec![
                                "a".to_string(),
                                "b".to_string(),
                                "c".to_string(),
                                "d".to_string(),
                            ],
                            correct: 0,
                            difficulty: Default::default(),
                        })
                        .collect(),
                }),
                Behavior::Empty => Ok(QuestionSet::default()),
                Behavior::Fail(make) => Err(make()),
            }
        }
    }

    #[async_trait]
    impl QuestionProvider for ScriptedProvider {
        fn source(&self) -> ApiSource {
            self.source
        }

        async fn movie_questions(
            &self,
            _movie: &Movie,
            _count: usize,
        ) -> Result<QuestionSet, ProviderError> {
            self.respond()
        }

        async fn collection_questions(
            &self,
            _movies: &[Movie],
            _count: usize,
        ) -> Result<QuestionSet, ProviderError> {
            self.respond()
        }

        async fn test_connection(&self) -> bool {
            true
        }
    }

    async fn seeded_store(movie_count: usize) -> (SqliteStore, i64, Vec<i64>) {
        let store = SqliteStore::connect_in_memory().await.unwrap();
        let user = store.add_user("Alice", "alice@example.com").await.unwrap();

        let mut movie_ids = Vec::new();
        for i in 0..movie_count {
            let movie = store
                .add_movie(
                    user.id,
                    &NewMovie {
                        title: format!("Movie {}", i),
                        year: Some(1990 + i as i32),
                        ..NewMovie::default()
                    },
                )
                .await
                .unwrap();
            movie_ids.push(movie.id);
        }
        (store, user.id, movie_ids)
    }

    fn make_engine(
        store: SqliteStore,
        providers: Vec<Box<dyn QuestionProvider>>,
    ) -> TriviaEngine {
        TriviaEngine::new(store, providers, TriviaConfig::default())
    }

    #[tokio::test]
    async fn unknown_user_is_rejected_before_any_provider_call() {
        let (store, _user, movies) = seeded_store(1).await;
        let (provider, calls) = ScriptedProvider::new(ApiSource::RapidApi, Behavior::Questions(7));
        let engine = make_engine(store, vec![provider]);

        let err = engine.generate_movie_trivia(999, movies[0]).await.unwrap_err();
        assert!(matches!(err, AppError::UserNotFound(999)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn movie_must_belong_to_the_user() {
        let (store, user_id, _movies) = seeded_store(1).await;
        let other = store.add_user("Bob", "bob@example.com").await.unwrap();
        let foreign = store
            .add_movie(
                other.id,
                &NewMovie {
                    title: "Not yours".to_string(),
                    ..NewMovie::default()
                },
            )
            .await
            .unwrap();

        let (provider, _) = ScriptedProvider::new(ApiSource::RapidApi, Behavior::Questions(7));
        let engine = make_engine(store, vec![provider]);

        let err = engine
            .generate_movie_trivia(user_id, foreign.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MovieNotFound(_)));
    }

    #[tokio::test]
    async fn collection_requires_minimum_movies() {
        for (have, should_pass) in [(1usize, false), (2, false), (3, true)] {
            let (store, user_id, _) = seeded_store(have).await;
            let (provider, _) =
                ScriptedProvider::new(ApiSource::RapidApi, Behavior::Questions(21));
            let engine = make_engine(store, vec![provider]);

            let result = engine.generate_collection_trivia(user_id).await;
            if should_pass {
                assert!(result.is_ok());
            } else {
                match result.unwrap_err() {
                    AppError::InsufficientMovies {
                        movie_count,
                        required_count,
                        ..
                    } => {
                        assert_eq!(movie_count, have);
                        assert_eq!(required_count, 3);
                    }
                    other => panic!("unexpected error: {:?}", other),
                }
            }
        }
    }

    #[tokio::test]
    async fn primary_failure_falls_back_to_secondary_exactly_once() {
        let (store, user_id, movies) = seeded_store(1).await;
        let (primary, primary_calls) =
            ScriptedProvider::new(ApiSource::RapidApi, Behavior::Fail(|| ProviderError::Unavailable));
        let (secondary, secondary_calls) =
            ScriptedProvider::new(ApiSource::OpenAi, Behavior::Questions(7));
        let engine = make_engine(store, vec![primary, secondary]);

        let trivia = engine.generate_movie_trivia(user_id, movies[0]).await.unwrap();
        assert_eq!(trivia.api_used, ApiSource::OpenAi);
        assert_eq!(trivia.questions.len(), 7);
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
        assert_eq!(secondary_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn quota_exhaustion_is_a_soft_skip() {
        let (store, user_id, movies) = seeded_store(1).await;
        let (primary, primary_calls) = ScriptedProvider::new(
            ApiSource::RapidApi,
            Behavior::Fail(|| ProviderError::QuotaExhausted),
        );
        let (secondary, _) = ScriptedProvider::new(ApiSource::OpenAi, Behavior::Questions(7));
        let engine = make_engine(store, vec![primary, secondary]);

        let trivia = engine.generate_movie_trivia(user_id, movies[0]).await.unwrap();
        assert_eq!(trivia.api_used, ApiSource::OpenAi);
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_primary_result_also_falls_back() {
        let (store, user_id, movies) = seeded_store(1).await;
        let (primary, _) = ScriptedProvider::new(ApiSource::RapidApi, Behavior::Empty);
        let (secondary, _) = ScriptedProvider::new(ApiSource::OpenAi, Behavior::Questions(7));
        let engine = make_engine(store, vec![primary, secondary]);

        let trivia = engine.generate_movie_trivia(user_id, movies[0]).await.unwrap();
        assert_eq!(trivia.api_used, ApiSource::OpenAi);
    }

    #[tokio::test]
    async fn exhausting_all_providers_is_a_typed_error() {
        let (store, user_id, movies) = seeded_store(1).await;
        let (primary, primary_calls) =
            ScriptedProvider::new(ApiSource::RapidApi, Behavior::Fail(|| ProviderError::Unavailable));
        let (secondary, secondary_calls) = ScriptedProvider::new(
            ApiSource::OpenAi,
            Behavior::Fail(|| ProviderError::MalformedResponse),
        );
        let engine = make_engine(store, vec![primary, secondary]);

        let err = engine.generate_movie_trivia(user_id, movies[0]).await.unwrap_err();
        match err {
            AppError::TriviaGeneration { trivia_type } => {
                assert_eq!(trivia_type, TriviaType::Movie);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        // One fallback attempt, never a retry loop.
        assert_eq!(primary_calls.load(Ordering::SeqCst), 1);
        assert_eq!(secondary_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn oversized_provider_output_is_truncated_to_contract() {
        let (store, user_id, movies) = seeded_store(1).await;
        let (provider, _) = ScriptedProvider::new(ApiSource::RapidApi, Behavior::Questions(12));
        let engine = make_engine(store, vec![provider]);

        let trivia = engine.generate_movie_trivia(user_id, movies[0]).await.unwrap();
        assert_eq!(trivia.questions.len(), 7);

        let (store, user_id, _) = seeded_store(3).await;
        let (provider, _) = ScriptedProvider::new(ApiSource::RapidApi, Behavior::Questions(30));
        let engine = make_engine(store, vec![provider]);

        let trivia = engine.generate_collection_trivia(user_id).await.unwrap();
        assert_eq!(trivia.questions.len(), 21);
        assert_eq!(trivia.movie_id, None);
        assert_eq!(trivia.trivia_type, TriviaType::Collection);
    }
}
