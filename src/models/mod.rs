pub mod fingerprint;
pub mod loaders;
pub mod record;
pub mod resource;
pub mod task;

pub use fingerprint::{FingerprintGenerator, FingerprintProfile};
pub use loaders::{load_accounts, load_all_seed_files, load_proxies, load_seed_tasks};
pub use record::{CrawlRecord, RecordKind};
pub use resource::{AccountCredential, PoolItem, ProxyEndpoint};
pub use task::{NewTask, Priority, Task, TaskId, TaskKind, TaskOutcome, TaskRecord, TaskStatus};
