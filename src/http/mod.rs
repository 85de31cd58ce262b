pub mod client;
pub mod method;
pub mod normalize;
pub mod request;
pub mod response;
