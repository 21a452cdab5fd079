//! Remote executors: the fetch capability the dispatch engine drives.
//!
//! [`RemoteExecutor`] is the black-box seam: one call fetches one target
//! and reports either a [`Payload`](crawlgrid_core::Payload) or a
//! [`FetchErrorKind`](crawlgrid_core::FetchErrorKind). [`HttpExecutor`]
//! is the production implementation, talking either directly to the
//! target or to a browser session on a grid.

pub mod http;
pub mod remote;

pub use http::{HttpExecutor, HttpExecutorError};
pub use remote::RemoteExecutor;
