use crate::error::ProviderError;
use crate::models::{ApiSource, Difficulty, Movie, Question, QuestionSet};
use crate::trivia::QuestionProvider;
use async_trait::async_trait;
use tracing::info;

/// Offline question generator. Only wired in when the `offline` deployment
/// mode is explicitly selected; it is never a silent fallback behind the
/// network providers.
pub struct MockTriviaClient;

impl MockTriviaClient {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MockTriviaClient {
    fn default() -> Self {
        Self::new()
    }
}

fn question(
    text: String,
    options: [String; 4],
    correct: usize,
    difficulty: Difficulty,
) -> Question {
    Question {
        question: text,
        options: options.to_vec(),
        correct,
        difficulty,
    }
}

fn year_options(year: Option<i32>) -> ([String; 4], usize) {
    let year = year.unwrap_or(2000);
    (
        [
            (year - 1).to_string(),
            year.to_string(),
            (year + 1).to_string(),
            (year + 2).to_string(),
        ],
        1,
    )
}

fn movie_questions_for(movie: &Movie) -> Vec<Question> {
    let director = movie.director.as_deref().unwrap_or("Unknown").to_string();
    let genre = movie.genre.as_deref().unwrap_or("Drama").to_string();
    let (years, correct_year) = year_options(movie.year);

    vec![
        question(
            format!("What year was '{}' released?", movie.title),
            years,
            correct_year,
            Difficulty::Easy,
        ),
        question(
            format!("Who directed '{}'?", movie.title),
            [
                director,
                "Steven Spielberg".to_string(),
                "Christopher Nolan".to_string(),
                "Martin Scorsese".to_string(),
            ],
            0,
            Difficulty::Medium,
        ),
        question(
            format!("What genre is '{}'?", movie.title),
            [
                "Action".to_string(),
                "Comedy".to_string(),
                genre,
                "Horror".to_string(),
            ],
            2,
            Difficulty::Easy,
        ),
        question(
            format!("In '{}', what drives the main character?", movie.title),
            [
                "Love".to_string(),
                "Revenge".to_string(),
                "Money".to_string(),
                "Survival".to_string(),
            ],
            0,
            Difficulty::Hard,
        ),
        question(
            format!("Which quote is associated with '{}'?", movie.title),
            [
                "I'll be back".to_string(),
                "May the force be with you".to_string(),
                "Here's looking at you, kid".to_string(),
                "Show me the money".to_string(),
            ],
            2,
            Difficulty::VeryHard,
        ),
        question(
            format!("What filming technique was notably used in '{}'?", movie.title),
            [
                "Long takes".to_string(),
                "Split screen".to_string(),
                "Found footage".to_string(),
                "Time loops".to_string(),
            ],
            0,
            Difficulty::VeryHard,
        ),
        question(
            format!("What easter egg appears in '{}'?", movie.title),
            [
                "Stan Lee cameo".to_string(),
                "Director cameo".to_string(),
                "Previous movie reference".to_string(),
                "Hidden number".to_string(),
            ],
            1,
            Difficulty::HighestDifficulty,
        ),
    ]
}

fn collection_questions_for(movies: &[Movie], count: usize) -> Vec<Question> {
    let mut questions = Vec::new();

    for movie in movies.iter().take(3) {
        questions.push(question(
            format!(
                "Which movie in your collection was directed by {}?",
                movie.director.as_deref().unwrap_or("Unknown")
            ),
            [
                movie.title.clone(),
                "The Matrix".to_string(),
                "Inception".to_string(),
                "Pulp Fiction".to_string(),
            ],
            0,
            Difficulty::Medium,
        ));
    }

    if movies.len() >= 2 {
        let (first, second) = (&movies[0], &movies[1]);
        let first_is_earlier =
            first.year.unwrap_or(2000) <= second.year.unwrap_or(2000);
        questions.push(question(
            format!(
                "Between '{}' and '{}', which was released first?",
                first.title, second.title
            ),
            [
                first.title.clone(),
                second.title.clone(),
                "They were released the same year".to_string(),
                "Unknown".to_string(),
            ],
            if first_is_earlier { 0 } else { 1 },
            Difficulty::Medium,
        ));

        let n = movies.len();
        questions.push(question(
            "How many movies do you have in your collection?".to_string(),
            [
                n.to_string(),
                (n + 1).to_string(),
                n.saturating_sub(1).to_string(),
                (n + 2).to_string(),
            ],
            0,
            Difficulty::Easy,
        ));
    }

    let fillers = [
        question(
            "Which genre appears most in your collection?".to_string(),
            [
                "Action".to_string(),
                "Drama".to_string(),
                "Comedy".to_string(),
                "Sci-Fi".to_string(),
            ],
            1,
            Difficulty::Medium,
        ),
        question(
            "What decade do most of your movies come from?".to_string(),
            [
                "1990s".to_string(),
                "2000s".to_string(),
                "2010s".to_string(),
                "2020s".to_string(),
            ],
            2,
            Difficulty::Easy,
        ),
        question(
            "Which director appears most frequently in your collection?".to_string(),
            [
                "Christopher Nolan".to_string(),
                "Steven Spielberg".to_string(),
                "Quentin Tarantino".to_string(),
                "Martin Scorsese".to_string(),
            ],
            0,
            Difficulty::Hard,
        ),
    ];

    let mut filler = fillers.iter().cycle();
    while questions.len() < count {
        questions.push(filler.next().expect("cycle never ends").clone());
    }
    questions.truncate(count);
    questions
}

#[async_trait]
impl QuestionProvider for MockTriviaClient {
    fn source(&self) -> ApiSource {
        ApiSource::Mock
    }

    async fn movie_questions(
        &self,
        movie: &Movie,
        _count: usize,
    ) -> Result<QuestionSet, ProviderError> {
        info!(title = %movie.title, "Generating offline movie trivia");
        Ok(QuestionSet {
            questions: movie_questions_for(movie),
        })
    }

    async fn collection_questions(
        &self,
        movies: &[Movie],
        count: usize,
    ) -> Result<QuestionSet, ProviderError> {
        info!(movies = movies.len(), "Generating offline collection trivia");
        Ok(QuestionSet {
            questions: collection_questions_for(movies, count),
        })
    }

    async fn test_connection(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movie(id: i64, title: &str, year: i32, director: &str) -> Movie {
        Movie {
            id,
            title: title.to_string(),
            director: Some(director.to_string()),
            year: Some(year),
            rating: None,
            genre: Some("Sci-Fi".to_string()),
            poster_url: None,
            user_id: 1,
        }
    }

    #[tokio::test]
    async fn movie_set_is_well_formed() {
        let client = MockTriviaClient::new();
        let set = client
            .movie_questions(&movie(1, "Alien", 1979, "Ridley Scott"), 7)
            .await
            .unwrap();
        assert_eq!(set.len(), 7);
        assert!(set.questions.iter().all(|q| q.is_well_formed()));
        assert!(set.questions[0].options.contains(&"1979".to_string()));
    }

    #[tokio::test]
    async fn collection_set_fills_to_requested_count() {
        let client = MockTriviaClient::new();
        let movies = vec![
            movie(1, "Alien", 1979, "Ridley Scott"),
            movie(2, "Aliens", 1986, "James Cameron"),
            movie(3, "Alien 3", 1992, "David Fincher"),
        ];
        let set = client.collection_questions(&movies, 21).await.unwrap();
        assert_eq!(set.len(), 21);
        assert!(set.questions.iter().all(|q| q.is_well_formed()));
    }

    #[tokio::test]
    async fn release_order_question_is_computed_from_data() {
        let client = MockTriviaClient::new();
        let movies = vec![
            movie(1, "Aliens", 1986, "James Cameron"),
            movie(2, "Alien", 1979, "Ridley Scott"),
            movie(3, "Alien 3", 1992, "David Fincher"),
        ];
        let set = client.collection_questions(&movies, 21).await.unwrap();
        let ordering = set
            .questions
            .iter()
            .find(|q| q.question.contains("released first"))
            .unwrap();
        // Alien (1979) is the second option here.
        assert_eq!(ordering.correct, 1);
    }
}
