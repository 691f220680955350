//! Test Helper Utilities
//!
//! Shared utilities for royalty-engine integration tests

#![allow(dead_code)]

pub mod db_utils;

pub use db_utils::{
    add_placement, add_writer, add_writer_with, create_test_engine, create_test_engine_with,
    get_table_names, set_policy, upload_and_assign, WriterSeed,
};
