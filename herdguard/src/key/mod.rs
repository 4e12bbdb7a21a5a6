// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Cache key construction
//!
//! - [`mangler`]: logical key to bounded backend key
//! - [`args`]: function arguments to logical key, for memoization

pub mod args;
pub mod mangler;

pub use args::{function_key, function_multi_keys, function_namespace, KeyArgs, KeyPart};
pub use mangler::{bound_key, KeyMangler, MangleKey, MAX_KEY_SIZE};
