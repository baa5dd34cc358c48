pub mod icons;
pub mod progress;
pub mod summary;

pub use progress::PipelineUI;
pub use summary::render_summary;
