pub mod pipeline;
pub mod request;
pub mod residency;

pub use pipeline::*;
pub use request::*;
pub use residency::*;
