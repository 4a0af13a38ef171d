//! Feature engineering: temporal context and request encoding.

pub mod encoder;
pub mod temporal;

pub use encoder::{
    AGE_CATEGORIES, AGE_GROUPS, CATEGORY_SCHEMA_VERSION, Encoded, EncoderInput, EncoderState,
    FeatureColumn, FeatureVector, IPRESS_LEVELS, N_FEATURES, SEX_CATEGORIES, StandardScaler,
    age_category,
};
pub use temporal::{TemporalFeatures, sweep};
