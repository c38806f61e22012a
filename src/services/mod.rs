pub mod community_service;
pub mod pagination;
pub mod query_string;
pub mod reply_cache;
pub mod reply_formatter;
pub mod reply_service;
pub mod reply_tree;
pub mod score;
