// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
// Request descriptor parser for YAML (and JSON, which parses as YAML)

use crate::domain::descriptor::{DescriptorError, DescriptorParser, RequestDescriptor};

#[derive(Debug, Default, Clone)]
pub struct YamlDescriptorParser;

impl YamlDescriptorParser {
    pub fn new() -> Self {
        Self
    }
}

impl DescriptorParser for YamlDescriptorParser {
    fn parse(&self, text: &str) -> Result<RequestDescriptor, DescriptorError> {
        if text.trim().is_empty() {
            return Err(DescriptorError::Empty);
        }
        let descriptor: RequestDescriptor =
            serde_yaml::from_str(text).map_err(|e| DescriptorError::Syntax(e.to_string()))?;
        descriptor.validate()?;
        Ok(descriptor)
    }
}
