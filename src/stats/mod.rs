pub mod calc;
pub mod window;

pub use window::SampleWindow;
