pub mod call;
pub mod client;
pub mod error;
pub mod shape;

pub use call::{CallBody, HttpCall};
pub use client::{HttpClient, HttpSettings};
pub use error::HttpError;
pub use shape::{ListOf, NoContent, Object, RawText, ResponseShape};
