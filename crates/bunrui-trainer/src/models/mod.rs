pub mod classic;
pub mod sequence;
pub mod stacked;

pub use classic::ClassicModel;
pub use sequence::{SequenceModel, SequenceModelConfig};
pub use stacked::StackedModel;
