//! Scoring and learning services built on top of the corpus database.

pub mod classify;
pub mod engine;
pub mod extract;
pub mod learning;
pub mod profile;
pub mod scoring;
pub mod signatures;
pub mod weights;

pub use classify::{learn_decision, CandidateScore, ClassificationResult, Classifier, Thresholds};
pub use engine::{ScoreReport, ScoringEngine, StrongMatchDetail};
pub use extract::{
    filter_candidates, ExtractError, ExtractedFunction, ExtractorRegistry, FunctionExtractor,
    SymbolExtractor,
};
pub use learning::{IngestOutcome, LearningPipeline};
pub use profile::{detect_packer, sniff_filetype, TargetProfile};
pub use scoring::{
    load_candidates, CandidateFingerprints, ProgressObserver, ScoreMatrix, ScoreRow,
    SimilarityScorer,
};
pub use signatures::SignatureFile;
pub use weights::WeightVector;
