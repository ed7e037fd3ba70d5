//! 服务层
//!
//! 抓取能力契约、NetCHB 门户实现、报告生成，以及产物/结果/身份三个后端客户端

pub mod artifact_store;
pub mod auth;
pub mod extractor;
pub mod netchb;
pub mod report;
pub mod result_store;

pub use artifact_store::{ArtifactStore, RestArtifactStore};
pub use auth::AuthService;
pub use extractor::{Credentials, SectionExtractor};
pub use netchb::NetChbPortal;
pub use result_store::{RestResultStore, ResultStore};
