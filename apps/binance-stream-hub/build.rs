//! Build Script for Binance Stream Hub
//!
//! Generates Rust protobuf stubs from workspace proto definitions.
//!
//! # Panics Policy
//!
//! Build scripts intentionally use `.expect()` and panic on failure because:
//! - Build scripts MUST halt the build process when prerequisites are missing
//! - There is no caller to propagate errors to - the build system handles panics
//! - Descriptive panic messages guide developers to fix configuration issues
#![allow(clippy::expect_used)]

use std::path::PathBuf;

fn main() {
    // Rerun build script if it changes
    println!("cargo:rerun-if-changed=build.rs");

    // Rerun if proto files change
    println!("cargo:rerun-if-changed=../../packages/proto/coinwatch/");

    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let proto_root = manifest_dir.join("../../packages/proto");
    let proto_files = [proto_root.join("coinwatch/v1/stream_hub.proto")];

    tonic_prost_build::configure()
        .build_client(true) // Enable client for integration tests
        .build_server(true)
        .compile_protos(&proto_files, &[proto_root])
        .expect("Failed to compile protobuf definitions");
}
