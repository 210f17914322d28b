use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub graph: GraphConfig,
    pub logging: LoggingConfig,
    pub matcher: Option<MatcherConfig>,
    pub request: RequestConfig,
    pub diagnosis: DiagnosisConfig,
}

/// Knowledge graph database configuration
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Semantic matcher endpoint configuration
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

/// HTTP request configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Thresholds driving the session state machine and the planner
#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosisConfig {
    /// Top confidence at or above which a diagnosis is assembled.
    pub high_confidence_threshold: f64,
    /// Top confidence at which exploring becomes narrowing.
    pub narrowing_threshold: f64,
    /// Top confidence below which a long session is flagged stuck.
    pub stuck_confidence_threshold: f64,
    /// Rounds after which the stuck hint may fire.
    pub stuck_round_threshold: u32,
    /// Number of leading hypotheses the planner draws candidates from.
    pub recommend_top_k: usize,
    /// Maximum recommendations returned per turn.
    pub recommend_max: usize,
    /// Confirmed-phenomenon count at which the per-root-cause cap rises to 2.
    pub diversity_threshold: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let graph = GraphConfig {
            path: PathBuf::from(
                env::var("GRAPH_DATABASE_PATH")
                    .unwrap_or_else(|_| "./data/knowledge_graph.db".to_string()),
            ),
            max_connections: parse_env("GRAPH_MAX_CONNECTIONS", 5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let matcher = match env::var("MATCHER_BASE_URL") {
            Ok(url) if !url.trim().is_empty() => Some(MatcherConfig {
                base_url: url,
                api_key: env::var("MATCHER_API_KEY").ok().filter(|k| !k.is_empty()),
            }),
            _ => None,
        };

        let defaults = RequestConfig::default();
        let request = RequestConfig {
            timeout_ms: parse_env("REQUEST_TIMEOUT_MS", defaults.timeout_ms),
            max_retries: parse_env("MAX_RETRIES", defaults.max_retries),
            retry_delay_ms: parse_env("RETRY_DELAY_MS", defaults.retry_delay_ms),
        };

        let defaults = DiagnosisConfig::default();
        let diagnosis = DiagnosisConfig {
            high_confidence_threshold: parse_env(
                "HIGH_CONFIDENCE_THRESHOLD",
                defaults.high_confidence_threshold,
            ),
            narrowing_threshold: parse_env("NARROWING_THRESHOLD", defaults.narrowing_threshold),
            stuck_confidence_threshold: parse_env(
                "STUCK_CONFIDENCE_THRESHOLD",
                defaults.stuck_confidence_threshold,
            ),
            stuck_round_threshold: parse_env(
                "STUCK_ROUND_THRESHOLD",
                defaults.stuck_round_threshold,
            ),
            recommend_top_k: parse_env("RECOMMEND_TOP_K", defaults.recommend_top_k),
            recommend_max: parse_env("RECOMMEND_MAX", defaults.recommend_max),
            diversity_threshold: parse_env("DIVERSITY_THRESHOLD", defaults.diversity_threshold),
        };
        diagnosis.validate()?;

        Ok(Config {
            graph,
            logging,
            matcher,
            request,
            diagnosis,
        })
    }
}

impl DiagnosisConfig {
    /// Reject threshold combinations the state machine cannot honor.
    pub fn validate(&self) -> Result<(), AppError> {
        let in_unit = |v: f64| (0.0..=1.0).contains(&v);
        if !in_unit(self.high_confidence_threshold)
            || !in_unit(self.narrowing_threshold)
            || !in_unit(self.stuck_confidence_threshold)
        {
            return Err(AppError::Config {
                message: "confidence thresholds must be within [0, 1]".to_string(),
            });
        }
        if self.narrowing_threshold > self.high_confidence_threshold {
            return Err(AppError::Config {
                message: "NARROWING_THRESHOLD must not exceed HIGH_CONFIDENCE_THRESHOLD"
                    .to_string(),
            });
        }
        if self.recommend_top_k == 0 {
            return Err(AppError::Config {
                message: "RECOMMEND_TOP_K must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for DiagnosisConfig {
    fn default() -> Self {
        Self {
            high_confidence_threshold: 0.95,
            narrowing_threshold: 0.50,
            stuck_confidence_threshold: 0.30,
            stuck_round_threshold: 3,
            recommend_top_k: 3,
            recommend_max: 5,
            diversity_threshold: 3,
        }
    }
}
