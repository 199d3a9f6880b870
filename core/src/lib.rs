pub mod aggregate;
pub mod completion;
pub mod db;
pub mod error;
pub mod goals;
pub mod googlefit;
pub mod models;
pub mod objects;
pub mod provider;
pub mod service;
pub mod settings;
pub mod steps;
pub mod store;
pub mod summary;

pub use error::{CoreError, CoreResult};
pub use service::FitpulseService;
pub use settings::Settings;
