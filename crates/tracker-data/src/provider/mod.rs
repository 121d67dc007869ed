//! 외부 가격 데이터 제공자.

pub mod yahoo;

pub use yahoo::YahooFetchClient;
