#![allow(dead_code)]

pub use scrapedeck_test_utils::{builders, fake_worker, init_tracing, with_timeout};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;
