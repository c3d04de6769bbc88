pub mod categorization;
pub mod config;
pub mod env_boot;
pub mod logging;
pub mod models;
pub mod orchestrator;
pub mod providers;
pub mod taxonomy;
pub mod tasks;
pub mod warehouse;

pub mod util {
    pub mod cache;
    pub mod env;
    pub mod http;
    pub mod retry;
}
