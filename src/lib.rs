pub mod aggregate;
pub mod digest_store;
pub mod dup_engine;
pub mod dup_tree;
pub mod error;
pub mod hash;
pub mod logging;
pub mod node;
pub mod pipeline;
pub mod report;
pub mod util;
pub mod walk;

pub use dup_engine::{find_duplicates, DuplicateMember, DuplicateSet};
pub use error::{CoreError, CoreResult};
pub use hash::{from_name, Hash};
pub use node::{HashMode, NodeRecord, NodeType};
pub use pipeline::{run_pipeline, PipelineConfig};
pub use report::{ReportHead, ReportReader, ReportWriter, TailLine};
