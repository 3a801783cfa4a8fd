//! End-to-end tests: full project lifecycle against a scripted backend.

mod harness;
mod scenarios;
