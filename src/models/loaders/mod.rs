pub mod toml_loader;

pub use toml_loader::{load_accounts, load_all_seed_files, load_proxies, load_seed_tasks};
