//! Streaming reader for Flux query results.
//!
//! [`QueryClient::run_query`] posts a query and hands back a
//! [`TransferHandle`]. The response body is read chunk by chunk until it ends
//! or exceeds the configured byte cap, in which case the text is cut back to
//! the last complete row. The transfer can be cancelled at any point.

mod cancel;
pub mod client;
pub mod config;
mod consumer;
pub mod decode;
mod error;
mod handle;
pub mod lines;
pub mod request;
pub mod source;
pub mod utils;

pub use cancel::CancelSignal;
pub use client::QueryClient;
pub use config::{DEFAULT_BYTE_CAP, QueryConfig};
pub use consumer::{QueryResult, consume};
pub use error::{FluxReadError, Result};
pub use handle::TransferHandle;
pub use request::{Annotation, Dialect, QueryBody, TransferRequest};
pub use source::{ByteSource, StreamSource};
