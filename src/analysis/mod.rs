pub mod duplicates;
pub mod priority;
pub mod search;

pub use duplicates::{find_duplicates, resolve, DuplicateCandidate, ResolutionReport};
pub use priority::{category_counts, PrioritizedArticle, PriorityRules, PriorityScorer};
pub use search::{SearchHit, SearchIndex, DEFAULT_RESULT_LIMIT};
