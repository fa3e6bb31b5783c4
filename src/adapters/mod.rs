// 外部系統的具體實作：各系統 adapter、身分查詢、job 目錄與專案儲存

pub mod ci;
pub mod identity;
pub mod issue_tracker;
pub mod job_source;
pub mod scm;
pub mod store;
pub mod wiki;

pub use ci::{CiAdapter, WebhookProxy};
pub use identity::RestIdentityDirectory;
pub use issue_tracker::IssueTrackerAdapter;
pub use job_source::HttpJobSource;
pub use scm::ScmAdapter;
pub use store::InMemoryProjectStore;
pub use wiki::WikiAdapter;
