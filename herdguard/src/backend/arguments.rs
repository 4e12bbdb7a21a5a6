// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Backend-specific configuration arguments

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Free-form argument map handed to a backend constructor
///
/// Serialized as a plain JSON object, so a region configuration can carry
/// whatever keys the chosen engine understands.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendArguments(Map<String, Value>);

impl BackendArguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.0.insert(name.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<Value>) {
        self.0.insert(name.to_string(), value.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn get_str(&self, name: &str) -> Result<Option<&str>, ConfigError> {
        match self.0.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(invalid(name, "a string", other)),
        }
    }

    pub fn require_str(&self, name: &str) -> Result<&str, ConfigError> {
        self.get_str(name)?.ok_or_else(|| ConfigError::InvalidArgument {
            name: name.to_string(),
            reason: "argument is required".to_string(),
        })
    }

    pub fn get_bool(&self, name: &str) -> Result<Option<bool>, ConfigError> {
        match self.0.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(invalid(name, "a boolean", other)),
        }
    }

    /// Read a duration given in (possibly fractional) seconds
    pub fn get_duration(&self, name: &str) -> Result<Option<Duration>, ConfigError> {
        match self.0.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_f64()
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
                .map(Some)
                .ok_or_else(|| invalid(name, "a non-negative number of seconds", value)),
        }
    }
}

impl From<Map<String, Value>> for BackendArguments {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn invalid(name: &str, expected: &str, got: &Value) -> ConfigError {
    ConfigError::InvalidArgument {
        name: name.to_string(),
        reason: format!("expected {}, got {}", expected, got),
    }
}
