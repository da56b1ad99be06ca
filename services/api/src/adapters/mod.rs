pub mod db;
pub mod extractor;
pub mod outlook;

pub use db::DbAdapter;
pub use extractor::HttpExtractorAdapter;
pub use outlook::GraphMailAdapter;
