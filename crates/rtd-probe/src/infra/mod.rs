pub mod recorder;

pub use recorder::{ReadingRecorder, SampleRecord};
