// Integration tests: fixture projects written into temp directories and built end to end

mod build_tests;
mod chunking_tests;
mod dev_tests;
mod support;
