use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use url::Url;

pub const DEFAULT_RAPIDAPI_URL: &str = "https://chatgpt-ai-chat-bot.p.rapidapi.com/ask";
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_OMDB_URL: &str = "http://www.omdbapi.com/";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Configuration {
    pub rapidapi: Option<RapidApiConfig>,
    pub openai: Option<OpenAiConfig>,
    pub omdb: Option<OmdbConfig>,
    pub trivia: Option<TriviaConfig>,
    pub leaderboard: Option<LeaderboardConfig>,
    pub quota: Option<QuotaConfig>,
    pub database: Option<DatabaseConfig>,
    pub offline: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RapidApiConfig {
    #[serde(rename = "baseUrl")]
    pub base_url: Option<String>,
    #[serde(rename = "apikey")]
    pub api_key: Option<String>,
    #[serde(rename = "timeoutSeconds")]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OpenAiConfig {
    #[serde(rename = "baseUrl")]
    pub base_url: Option<String>,
    #[serde(rename = "apikey")]
    pub api_key: Option<String>,
    pub model: Option<String>,
    #[serde(rename = "timeoutSeconds")]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OmdbConfig {
    #[serde(rename = "baseUrl")]
    pub base_url: Option<String>,
    #[serde(rename = "apikey")]
    pub api_key: Option<String>,
    #[serde(rename = "timeoutSeconds")]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TriviaConfig {
    #[serde(rename = "movieQuestions")]
    pub movie_questions: Option<usize>,
    #[serde(rename = "collectionQuestions")]
    pub collection_questions: Option<usize>,
    #[serde(rename = "minCollectionSize")]
    pub min_collection_size: Option<usize>,
    #[serde(rename = "masterThreshold")]
    pub master_threshold: Option<i64>,
    #[serde(rename = "expertThreshold")]
    pub expert_threshold: Option<i64>,
    #[serde(rename = "buffThreshold")]
    pub buff_threshold: Option<i64>,
    #[serde(rename = "learningThreshold")]
    pub learning_threshold: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LeaderboardConfig {
    #[serde(rename = "globalLimit")]
    pub global_limit: Option<i64>,
    #[serde(rename = "collectionLimit")]
    pub collection_limit: Option<i64>,
    #[serde(rename = "movieLimit")]
    pub movie_limit: Option<i64>,
    #[serde(rename = "recentLimit")]
    pub recent_limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct QuotaConfig {
    #[serde(rename = "monthlyLimit")]
    pub monthly_limit: Option<u32>,
    #[serde(rename = "usageFile")]
    pub usage_file: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub path: Option<String>,
}

impl Configuration {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path))?;
        let config: Configuration =
            serde_yaml::from_str(&content).context("failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    // Base URLs are checked up front so a typo fails at startup, not mid-quiz.
    pub fn validate(&self) -> anyhow::Result<()> {
        for (section, url) in [
            ("rapidapi", self.rapidapi().base_url()),
            ("openai", self.openai().base_url()),
            ("omdb", self.omdb().base_url()),
        ] {
            Url::parse(&url).with_context(|| format!("invalid {} base URL: {}", section, url))?;
        }
        Ok(())
    }

    pub fn rapidapi(&self) -> RapidApiConfig {
        self.rapidapi.clone().unwrap_or_default()
    }

    pub fn openai(&self) -> OpenAiConfig {
        self.openai.clone().unwrap_or_default()
    }

    pub fn omdb(&self) -> OmdbConfig {
        self.omdb.clone().unwrap_or_default()
    }

    pub fn trivia(&self) -> TriviaConfig {
        self.trivia.clone().unwrap_or_default()
    }

    pub fn leaderboard(&self) -> LeaderboardConfig {
        self.leaderboard.clone().unwrap_or_default()
    }

    pub fn quota(&self) -> QuotaConfig {
        self.quota.clone().unwrap_or_default()
    }

    pub fn database_path(&self) -> String {
        self.database
            .as_ref()
            .and_then(|d| d.path.clone())
            .unwrap_or_else(|| "cinetrivia.sqlite".to_string())
    }

    pub fn offline(&self) -> bool {
        self.offline.unwrap_or(false)
    }
}

impl RapidApiConfig {
    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_RAPIDAPI_URL.to_string())
    }

    pub fn api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| env::var("RAPIDAPI_KEY").ok())
    }

    pub fn host(&self) -> String {
        Url::parse(&self.base_url())
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_default()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.unwrap_or(30))
    }
}

impl OpenAiConfig {
    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string())
    }

    pub fn api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| env::var("OPENAI_API_KEY").ok())
    }

    pub fn model(&self) -> String {
        self.model
            .clone()
            .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.unwrap_or(30))
    }
}

impl OmdbConfig {
    pub fn base_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_OMDB_URL.to_string())
    }

    pub fn api_key(&self) -> Option<String> {
        self.api_key.clone().or_else(|| env::var("OMDB_API_KEY").ok())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.unwrap_or(5))
    }
}

impl TriviaConfig {
    pub fn movie_questions(&self) -> usize {
        self.movie_questions.unwrap_or(7)
    }

    pub fn collection_questions(&self) -> usize {
        self.collection_questions.unwrap_or(21)
    }

    pub fn min_collection_size(&self) -> usize {
        self.min_collection_size.unwrap_or(3)
    }

    pub fn master_threshold(&self) -> i64 {
        self.master_threshold.unwrap_or(90)
    }

    pub fn expert_threshold(&self) -> i64 {
        self.expert_threshold.unwrap_or(75)
    }

    pub fn buff_threshold(&self) -> i64 {
        self.buff_threshold.unwrap_or(60)
    }

    pub fn learning_threshold(&self) -> i64 {
        self.learning_threshold.unwrap_or(40)
    }
}

impl LeaderboardConfig {
    pub fn global_limit(&self) -> i64 {
        self.global_limit.unwrap_or(20)
    }

    pub fn collection_limit(&self) -> i64 {
        self.collection_limit.unwrap_or(20)
    }

    pub fn movie_limit(&self) -> i64 {
        self.movie_limit.unwrap_or(15)
    }

    pub fn recent_limit(&self) -> i64 {
        self.recent_limit.unwrap_or(5)
    }
}

impl QuotaConfig {
    pub fn monthly_limit(&self) -> u32 {
        self.monthly_limit.unwrap_or(95)
    }

    pub fn usage_file(&self) -> String {
        self.usage_file
            .clone()
            .unwrap_or_else(|| "api_usage.json".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_applies_defaults() {
        let config = Configuration::default();
        assert_eq!(config.trivia().movie_questions(), 7);
        assert_eq!(config.trivia().collection_questions(), 21);
        assert_eq!(config.trivia().min_collection_size(), 3);
        assert_eq!(config.trivia().master_threshold(), 90);
        assert_eq!(config.trivia().learning_threshold(), 40);
        assert_eq!(config.leaderboard().global_limit(), 20);
        assert_eq!(config.leaderboard().collection_limit(), 20);
        assert_eq!(config.leaderboard().movie_limit(), 15);
        assert_eq!(config.leaderboard().recent_limit(), 5);
        assert_eq!(config.quota().monthly_limit(), 95);
        assert!(!config.offline());
    }

    #[test]
    fn yaml_sections_override_defaults() {
        let yaml = r#"
trivia:
  movieQuestions: 5
  minCollectionSize: 4
quota:
  monthlyLimit: 10
  usageFile: /tmp/usage.json
offline: true
"#;
        let config: Configuration = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.trivia().movie_questions(), 5);
        assert_eq!(config.trivia().min_collection_size(), 4);
        assert_eq!(config.trivia().collection_questions(), 21);
        assert_eq!(config.quota().monthly_limit(), 10);
        assert_eq!(config.quota().usage_file(), "/tmp/usage.json");
        assert!(config.offline());
    }

    #[test]
    fn malformed_base_url_fails_validation() {
        let config: Configuration = serde_yaml::from_str(
            r#"
rapidapi:
  baseUrl: "not a url"
"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rapidapi_host_derived_from_base_url() {
        let config = Configuration::default();
        assert_eq!(config.rapidapi().host(), "chatgpt-ai-chat-bot.p.rapidapi.com");
    }
}
