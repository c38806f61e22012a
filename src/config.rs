use serde::Deserialize;
use std::env;

use crate::models::TreeLimits;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Postgres connection string; without it the server runs on the
    /// in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    /// Enables the reply cache, rate limits and session checks.
    pub redis_url: Option<String>,
    pub jwt_secret: String,
    pub port: u16,
    pub host: String,
    pub allowed_origins: Vec<String>,
    pub reply_cache_ttl_secs: u64,
    pub max_tree_levels: u32,
    pub max_take: u32,
    pub max_tree_nodes: u64,
    pub default_page_size: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Self {
            database_url: env::var("DATABASE_URL").ok(),
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .unwrap_or(20),
            redis_url: env::var("REDIS_URL").ok(),
            jwt_secret: env::var("JWT_SECRET")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .unwrap_or(3000),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            allowed_origins: env::var("ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            reply_cache_ttl_secs: env::var("REPLY_CACHE_TTL_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            max_tree_levels: env::var("MAX_TREE_LEVELS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            max_take: env::var("MAX_TAKE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .unwrap_or(100),
            max_tree_nodes: env::var("MAX_TREE_NODES")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()
                .unwrap_or(10_000),
            default_page_size: env::var("DEFAULT_PAGE_SIZE")
                .unwrap_or_else(|_| "25".to_string())
                .parse()
                .unwrap_or(25),
        })
    }

    pub fn tree_limits(&self) -> TreeLimits {
        TreeLimits {
            max_levels: self.max_tree_levels,
            max_take: self.max_take,
            max_nodes: self.max_tree_nodes,
        }
    }

    /// Settings for tests and local tooling: no database, no Redis.
    pub fn for_tests(jwt_secret: &str) -> Self {
        Self {
            database_url: None,
            database_max_connections: 1,
            redis_url: None,
            jwt_secret: jwt_secret.to_string(),
            port: 0,
            host: "127.0.0.1".to_string(),
            allowed_origins: Vec::new(),
            reply_cache_ttl_secs: 0,
            max_tree_levels: 10,
            max_take: 100,
            max_tree_nodes: 10_000,
            default_page_size: 25,
        }
    }
}
