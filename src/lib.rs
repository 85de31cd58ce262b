//! Request execution and test evaluation engine for Getman.
//!
//! A [`RequestSpec`] is turned into one outbound HTTP call by the
//! [`Dispatcher`], the outcome is normalized into a [`ResponseRecord`], and for
//! test cases the observed outcome is judged against the declared expectation.
//! [`BatchRunner`] drives that pipeline over a whole collection, one case at a
//! time.

pub mod collections;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod store;
pub mod telemetry;
pub mod testing;

pub use collections::{CaseResult, Collection, TestCase, Workspace};
pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use http::client::{Dispatcher, TransportError, TransportErrorKind};
pub use http::method::HttpMethod;
pub use http::normalize::normalize;
pub use http::request::{KeyValue, RequestSpec};
pub use http::response::{ResponseData, ResponseRecord};
pub use testing::evaluate;
pub use testing::runner::{BatchRunner, RunEvent, RunReport, RunSignal};
