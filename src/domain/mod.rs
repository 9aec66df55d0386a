pub mod comment;
pub mod post;
pub mod subreddit;
pub mod vote;
