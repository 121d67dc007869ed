//! 파이프라인 전반에서 사용되는 공통 타입.

mod price;
mod tracker;
mod window;

pub use price::*;
pub use tracker::*;
pub use window::*;
