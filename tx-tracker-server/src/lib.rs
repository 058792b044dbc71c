mod server;
mod settings;

pub use server::run;
pub use settings::{RepositoryBackend, RepositorySettings, Settings, StoreBackend};
