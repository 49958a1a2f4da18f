pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod sync;

pub use config::Config;
pub use error::{AppError, Result};
pub use services::{
    CfModelStore, ExplorationRanker, ExplorationStrategy, HybridSearchPlanner,
    InteractionDecayEngine, RecommendationService, UserVectorSynthesizer,
};
