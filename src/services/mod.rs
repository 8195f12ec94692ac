mod article_writer;
mod content_fetcher;
mod content_store;
mod link_checker;
mod orchestrator;
mod wayback;

pub use article_writer::ArticleWriter;
pub use content_fetcher::{ContentFetcher, PageFetcher};
pub use content_store::ContentStore;
pub use link_checker::{InvalidLink, LinkChecker};
pub use orchestrator::FetchOrchestrator;
pub use wayback::{RecoveryResolver, WaybackClient};
