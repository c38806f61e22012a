pub mod community;
pub mod moderation;
pub mod page;
pub mod post;
pub mod reply;
pub mod tree;
pub mod vote;

pub use community::*;
pub use moderation::*;
pub use page::*;
pub use post::*;
pub use reply::*;
pub use tree::*;
pub use vote::*;
