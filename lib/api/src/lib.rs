//! # hybrix API
//!
//! HTTP surface over a [`hybrix_query::Executor`].

pub mod rest;

pub use rest::{configure, RestApi};
