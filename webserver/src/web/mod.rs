//! HTTP surface of the testing API

pub mod handlers;
