//! 외부 협력자 인터페이스와 조회 결과 모델.

mod fetch;
mod normalize;
mod store;

pub use fetch::*;
pub use normalize::*;
pub use store::*;
