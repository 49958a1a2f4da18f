pub mod exploration;
pub mod interaction_decay;
pub mod maturity;
pub mod recommendation;
pub mod search;
pub mod user_vector;
pub mod vector_blend;

pub use exploration::{
    CfArtifact, CfModelStore, CfSnapshot, ExplorationRanker, ExplorationStrategy, LatentFactors,
    UserItemMatrix,
};
pub use interaction_decay::InteractionDecayEngine;
pub use maturity::MaturityTier;
pub use recommendation::{RecommendMode, RecommendRequest, RecommendationService};
pub use search::{FilterBuilder, HybridSearchPlanner};
pub use user_vector::UserVectorSynthesizer;
pub use vector_blend::VectorBlender;
