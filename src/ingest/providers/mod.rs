pub mod json_board;
pub mod rss_feed;
