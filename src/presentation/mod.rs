pub mod app;
pub mod range;
pub mod renderer;

pub use renderer::run;
