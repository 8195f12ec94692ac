mod article;
mod reading;
mod report;
mod source;

pub use article::{Article, ArticleQuery, ExtractionMethod, NewArticle};
pub use reading::{CleanupReport, ReadingEntry, ReadingStats, ReadingStatus, ReadingUpdate};
pub use report::FetchReport;
pub use source::SourceRecord;
