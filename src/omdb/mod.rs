use crate::config::OmdbConfig;
use crate::http::HttpClient;
use crate::models::NewMovie;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

pub struct OmdbClient {
    http: HttpClient,
    config: OmdbConfig,
}

#[derive(Debug, Deserialize)]
struct OmdbResponse {
    #[serde(rename = "Response")]
    response: String,
    #[serde(rename = "Title")]
    title: Option<String>,
    #[serde(rename = "Year")]
    year: Option<String>,
    #[serde(rename = "Director")]
    director: Option<String>,
    #[serde(rename = "Genre")]
    genre: Option<String>,
    #[serde(rename = "Poster")]
    poster: Option<String>,
    #[serde(rename = "imdbRating")]
    imdb_rating: Option<String>,
    #[serde(rename = "Error")]
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OmdbMovie {
    pub title: String,
    pub director: Option<String>,
    pub year: Option<i32>,
    pub genre: Option<String>,
    pub poster: Option<String>,
    pub imdb_rating: Option<f64>,
}

impl OmdbClient {
    pub fn new(http: HttpClient, config: OmdbConfig) -> Self {
        Self { http, config }
    }

    #[instrument(skip(self))]
    pub async fn search_movie(&self, title: &str, year: Option<i32>) -> Option<OmdbMovie> {
        let Some(api_key) = self.config.api_key() else {
            debug!("No OMDb API key configured, skipping lookup");
            return None;
        };

        let mut url = format!(
            "{}?apikey={}&t={}&type=movie&plot=short",
            self.config.base_url(),
            api_key,
            urlencoding::encode(title)
        );
        if let Some(year) = year {
            url.push_str(&format!("&y={}", year));
        }

        match self.http.get_json::<OmdbResponse>(&url).await {
            Ok(data) if data.response == "True" => {
                info!("Found OMDb match for '{}'", title);
                Some(convert(data, title))
            }
            Ok(data) => {
                debug!(
                    "Movie not found in OMDb: {}",
                    data.error.unwrap_or_else(|| "unknown error".to_string())
                );
                None
            }
            Err(e) => {
                warn!("OMDb lookup failed for '{}': {}", title, e);
                None
            }
        }
    }

    /// Fill in whatever the user left blank from the OMDb record. Enrichment
    /// is best-effort: any failure leaves the movie exactly as supplied.
    pub async fn enhance(&self, movie: &mut NewMovie) {
        let Some(found) = self.search_movie(&movie.title, movie.year).await else {
            return;
        };
        debug!(matched = %found.title, "Enriching movie from OMDb");

        if movie.director.is_none() {
            movie.director = found.director;
        }
        if movie.year.is_none() {
            movie.year = found.year;
        }
        if movie.genre.is_none() {
            movie.genre = found.genre;
        }
        if movie.rating.is_none() {
            movie.rating = found.imdb_rating;
        }
        if movie.poster_url.is_none() {
            movie.poster_url = found.poster;
        }
    }

    pub async fn test_connection(&self) -> bool {
        self.search_movie("Casablanca", Some(1942)).await.is_some()
    }
}

fn convert(data: OmdbResponse, fallback_title: &str) -> OmdbMovie {
    OmdbMovie {
        title: data.title.unwrap_or_else(|| fallback_title.to_string()),
        director: data.director.filter(|d| !is_blank(d)),
        year: data.year.as_deref().and_then(parse_year),
        genre: data.genre.filter(|g| !is_blank(g)),
        poster: data.poster.filter(|p| !is_blank(p)),
        imdb_rating: data
            .imdb_rating
            .filter(|r| r != "N/A")
            .and_then(|r| r.parse().ok()),
    }
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty() || value == "N/A"
}

// OMDb years come back as "1979" but also as ranges like "1999-2001".
fn parse_year(raw: &str) -> Option<i32> {
    let digits: String = raw.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(json: &str) -> OmdbResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn converts_a_full_record() {
        let data = response(
            r#"{
                "Response": "True",
                "Title": "Alien",
                "Year": "1979",
                "Director": "Ridley Scott",
                "Genre": "Horror, Sci-Fi",
                "Poster": "https://example.com/alien.jpg",
                "imdbRating": "8.5"
            }"#,
        );
        let movie = convert(data, "alien");
        assert_eq!(movie.title, "Alien");
        assert_eq!(movie.year, Some(1979));
        assert_eq!(movie.imdb_rating, Some(8.5));
    }

    #[test]
    fn filters_na_placeholders() {
        let data = response(
            r#"{
                "Response": "True",
                "Title": "Obscure Film",
                "Year": "N/A",
                "Director": "N/A",
                "Poster": "N/A",
                "imdbRating": "N/A"
            }"#,
        );
        let movie = convert(data, "Obscure Film");
        assert_eq!(movie.year, None);
        assert_eq!(movie.director, None);
        assert_eq!(movie.poster, None);
        assert_eq!(movie.imdb_rating, None);
    }

    #[test]
    fn parses_year_ranges() {
        assert_eq!(parse_year("1999-2001"), Some(1999));
        assert_eq!(parse_year("2010"), Some(2010));
        assert_eq!(parse_year("N/A"), None);
    }
}
