mod catalog;
mod config;
mod error;
mod http;
mod leaderboard;
mod mock;
mod models;
mod omdb;
mod openai;
mod quota;
mod rapidapi;
mod session;
mod store;
mod trivia;

use anyhow::Result;
use catalog::CatalogService;
use clap::{Parser, Subcommand};
use config::Configuration;
use http::HttpClient;
use leaderboard::{LeaderboardScope, LeaderboardService};
use mock::MockTriviaClient;
use models::NewMovie;
use omdb::OmdbClient;
use openai::OpenAiClient;
use quota::{FileUsageStore, UsageTracker};
use rapidapi::RapidApiClient;
use session::{SessionStore, SessionView, TriviaSession};
use std::io::Write as _;
use std::sync::Arc;
use store::SqliteStore;
use tracing::info;
use trivia::{QuestionProvider, TriviaEngine};
use uuid::Uuid;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Log level
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a user
    AddUser { name: String, email: String },
    /// List all users
    Users,
    /// Add a movie to a user's collection
    AddMovie {
        user_id: i64,
        title: String,
        #[arg(long)]
        director: Option<String>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        rating: Option<f64>,
        #[arg(long)]
        genre: Option<String>,
    },
    /// List a user's movies
    Movies { user_id: i64 },
    /// Delete a movie
    DeleteMovie { movie_id: i64 },
    /// Write a review for a movie
    AddReview {
        movie_id: i64,
        content: String,
        #[arg(long)]
        rating: Option<i64>,
    },
    /// List reviews for a movie
    Reviews { movie_id: i64 },
    /// Like a review
    LikeReview { review_id: i64 },
    /// Play a trivia quiz: the whole collection, or one movie with --movie
    Play {
        user_id: i64,
        #[arg(long)]
        movie: Option<i64>,
        /// Use the local question generator instead of the network providers
        #[arg(long)]
        offline: bool,
    },
    /// Show a leaderboard (global by default)
    Leaderboard {
        #[arg(long, conflicts_with = "collection")]
        movie: Option<i64>,
        #[arg(long)]
        collection: bool,
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Show a user's trivia statistics
    Stats { user_id: i64 },
    /// Show the monthly API usage, or reset it
    Quota {
        #[arg(long)]
        reset: bool,
    },
    /// Test trivia provider connections
    TestApis {
        #[arg(long)]
        offline: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(&cli.log_level)
        .init();

    let config = load_config(&cli.config)?;
    let store = SqliteStore::connect(&config.database_path()).await?;

    match cli.command {
        Command::AddUser { name, email } => {
            let user = catalog_service(&config, &store).create_user(&name, &email).await?;
            println!("Created user #{}: {} <{}>", user.id, user.name, user.email);
        }
        Command::Users => {
            for user in catalog_service(&config, &store).list_users().await? {
                println!("#{}  {} <{}>", user.id, user.name, user.email);
            }
        }
        Command::AddMovie {
            user_id,
            title,
            director,
            year,
            rating,
            genre,
        } => {
            let movie = catalog_service(&config, &store)
                .create_movie_for_user(
                    user_id,
                    NewMovie {
                        title,
                        director,
                        year,
                        rating,
                        genre,
                        poster_url: None,
                    },
                )
                .await?;
            println!(
                "Added movie #{}: {} ({})",
                movie.id,
                movie.title,
                movie.year.map(|y| y.to_string()).unwrap_or_else(|| "?".to_string())
            );
        }
        Command::Movies { user_id } => {
            for movie in catalog_service(&config, &store).list_user_movies(user_id).await? {
                println!(
                    "#{}  {} ({})  {}  {}",
                    movie.id,
                    movie.title,
                    movie.year.map(|y| y.to_string()).unwrap_or_else(|| "?".to_string()),
                    movie.director.as_deref().unwrap_or("unknown director"),
                    movie
                        .rating
                        .map(|r| format!("{:.1}/10", r))
                        .unwrap_or_else(|| "unrated".to_string()),
                );
            }
        }
        Command::DeleteMovie { movie_id } => {
            catalog_service(&config, &store).delete_movie(movie_id).await?;
            println!("Deleted movie #{}", movie_id);
        }
        Command::AddReview {
            movie_id,
            content,
            rating,
        } => {
            let review = catalog_service(&config, &store)
                .create_review(movie_id, &content, rating)
                .await?;
            println!("Added review #{} for movie #{}", review.id, review.movie_id);
        }
        Command::Reviews { movie_id } => {
            for review in catalog_service(&config, &store).list_movie_reviews(movie_id).await? {
                println!(
                    "#{}  {}  {} likes  {}",
                    review.id,
                    review
                        .reviewer_rating
                        .map(|r| format!("{}/10", r))
                        .unwrap_or_else(|| "unrated".to_string()),
                    review.likes,
                    review.content,
                );
            }
        }
        Command::LikeReview { review_id } => {
            let review = catalog_service(&config, &store).like_review(review_id).await?;
            println!("Review #{} now has {} likes", review.id, review.likes);
        }
        Command::Play {
            user_id,
            movie,
            offline,
        } => {
            play(&config, &store, user_id, movie, offline).await?;
        }
        Command::Leaderboard {
            movie,
            collection,
            limit,
        } => {
            let scope = match (movie, collection) {
                (Some(movie_id), _) => LeaderboardScope::Movie(movie_id),
                (None, true) => LeaderboardScope::Collection,
                (None, false) => LeaderboardScope::Global,
            };
            let service = LeaderboardService::new(store.clone(), config.leaderboard());
            let entries = service.leaderboard(scope, limit).await?;
            if entries.is_empty() {
                println!("No trivia scores yet.");
            }
            for (rank, entry) in entries.iter().enumerate() {
                println!(
                    "{:>3}. {}  {}/{} ({}%)  {} trivia{}  {}",
                    rank + 1,
                    entry.user_name,
                    entry.score,
                    entry.total_questions,
                    entry.percentage,
                    entry.trivia_type,
                    entry
                        .movie_title
                        .as_deref()
                        .map(|t| format!(" on '{}'", t))
                        .unwrap_or_default(),
                    entry.created_at.format("%Y-%m-%d %H:%M"),
                );
            }
        }
        Command::Stats { user_id } => {
            let service = LeaderboardService::new(store.clone(), config.leaderboard());
            let (user, stats) = service.user_stats(user_id).await?;
            println!("Trivia statistics for {}:", user.name);
            println!("  Attempts: {} ({} movie, {} collection)", stats.total_attempts, stats.movie_attempts, stats.collection_attempts);
            println!("  Best: {}%  Average: {}%", stats.best_percentage, stats.average_percentage);
            for score in &stats.recent_scores {
                println!(
                    "  {}  {} trivia  {}/{} ({}%)",
                    score.created_at.format("%Y-%m-%d"),
                    score.trivia_type,
                    score.score,
                    score.total_questions,
                    score.percentage,
                );
            }
        }
        Command::Quota { reset } => {
            let tracker = build_tracker(&config);
            if reset {
                tracker.force_reset();
                println!("API usage counter reset.");
            }
            let stats = tracker.usage_stats();
            println!(
                "API usage for {}: {}/{} calls made, {} remaining (last reset {})",
                stats.month_year,
                stats.calls_made,
                stats.limit,
                stats.remaining,
                stats.last_reset.format("%Y-%m-%d"),
            );
        }
        Command::TestApis { offline } => {
            let tracker = build_tracker(&config);
            let engine = TriviaEngine::new(
                store.clone(),
                build_providers(&config, tracker, offline),
                config.trivia(),
            );
            for (source, ok) in engine.test_apis().await {
                println!("{}: {}", source, if ok { "ok" } else { "unavailable" });
            }
        }
    }

    Ok(())
}

fn load_config(path: &str) -> Result<Configuration> {
    if std::path::Path::new(path).exists() {
        let config = Configuration::from_file(path)?;
        info!("Configuration loaded from: {}", path);
        Ok(config)
    } else {
        info!("No config file at {}, using defaults", path);
        Ok(Configuration::default())
    }
}

fn catalog_service(config: &Configuration, store: &SqliteStore) -> CatalogService {
    let omdb_config = config.omdb();
    let omdb = omdb_config
        .api_key()
        .is_some()
        .then(|| OmdbClient::new(HttpClient::with_timeout(omdb_config.timeout()), omdb_config));
    CatalogService::new(store.clone(), omdb)
}

fn build_tracker(config: &Configuration) -> Arc<UsageTracker> {
    let quota = config.quota();
    Arc::new(UsageTracker::new(
        Box::new(FileUsageStore::new(quota.usage_file())),
        quota.monthly_limit(),
    ))
}

fn build_providers(
    config: &Configuration,
    tracker: Arc<UsageTracker>,
    offline: bool,
) -> Vec<Box<dyn QuestionProvider>> {
    if offline || config.offline() {
        info!("Offline mode selected, using the local question generator");
        return vec![Box::new(MockTriviaClient::new())];
    }

    let rapidapi = config.rapidapi();
    let openai = config.openai();
    vec![
        Box::new(RapidApiClient::new(
            HttpClient::with_timeout(rapidapi.timeout()),
            rapidapi.clone(),
            tracker,
        )),
        Box::new(OpenAiClient::new(
            HttpClient::with_timeout(openai.timeout()),
            openai.clone(),
        )),
    ]
}

async fn play(
    config: &Configuration,
    store: &SqliteStore,
    user_id: i64,
    movie: Option<i64>,
    offline: bool,
) -> Result<()> {
    let tracker = build_tracker(config);

    if !offline && !config.offline() {
        let stats = tracker.usage_stats();
        if stats.remaining == 0 {
            println!(
                "Monthly API limit reached ({}/{}); the primary provider will be skipped.",
                stats.calls_made, stats.limit
            );
        } else if stats.remaining <= 5 {
            println!("Warning: only {} API calls remaining this month.", stats.remaining);
        }
    }

    let engine = TriviaEngine::new(
        store.clone(),
        build_providers(config, tracker, offline),
        config.trivia(),
    );

    let generated = match movie {
        Some(movie_id) => engine.generate_movie_trivia(user_id, movie_id).await?,
        None => engine.generate_collection_trivia(user_id).await?,
    };

    println!(
        "Starting {} trivia: {} questions (source: {})",
        generated.trivia_type,
        generated.questions.len(),
        generated.api_used,
    );

    let mut sessions = SessionStore::new();
    let key = Uuid::new_v4();
    sessions.start(key, TriviaSession::new(generated));
    let started = std::time::Instant::now();
    let stdin = std::io::stdin();

    loop {
        let done = {
            let Some(session) = sessions.get_mut(&key) else {
                return Ok(());
            };
            match session.current_question() {
                SessionView::Complete => true,
                SessionView::InProgress { question, progress } => {
                    println!(
                        "\nQuestion {}/{} ({}%) [{}]",
                        progress.current, progress.total, progress.percentage, question.difficulty,
                    );
                    println!("{}", question.question);
                    for (i, option) in question.options.iter().enumerate() {
                        println!("  {}. {}", i + 1, option);
                    }
                    false
                }
            }
        };
        if done {
            break;
        }

        print!("Answer (1-4, q to quit): ");
        std::io::stdout().flush().ok();

        let mut input = String::new();
        if stdin.read_line(&mut input).is_err() {
            eprintln!("Error reading input, try again.");
            continue;
        }
        let raw = input.trim();

        if raw.eq_ignore_ascii_case("q") || raw.eq_ignore_ascii_case("quit") {
            sessions.quit(&key);
            println!("Trivia session ended, no score recorded.");
            return Ok(());
        }

        match raw.parse::<usize>() {
            Ok(n) if (1..=4).contains(&n) => {
                let Some(session) = sessions.get_mut(&key) else {
                    return Ok(());
                };
                session.submit_answer(n - 1);
                if let Some(answer) = session.answers().last() {
                    if answer.is_correct {
                        println!("Correct!");
                    } else {
                        println!(
                            "Wrong, the answer was: {}",
                            answer.options[answer.correct_answer]
                        );
                    }
                }
            }
            _ => println!("Enter a number between 1 and 4."),
        }
    }

    let Some(session) = sessions.take_completed(&key) else {
        return Ok(());
    };
    let elapsed = started.elapsed().as_secs_f64();
    let results = session.results(&config.trivia());

    println!("\n=== RESULTS ===");
    println!("Score: {}/{} ({}%)", results.score, results.total, results.percentage);
    println!("Performance: {}", results.performance.label());
    let wrong: Vec<_> = results.answers.iter().filter(|a| !a.is_correct).collect();
    if !wrong.is_empty() {
        println!("Missed questions:");
        for answer in wrong {
            println!("  {} -> {}", answer.question, answer.options[answer.correct_answer]);
        }
    }

    let boards = LeaderboardService::new(store.clone(), config.leaderboard());
    if boards.save_score(&session, Some(elapsed)).await.is_none() {
        println!("(the score could not be saved; results are shown anyway)");
    }

    Ok(())
}
