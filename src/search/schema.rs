//! Minimal property schema
//!
//! The scorer needs to know, per property, the tokenization mode and
//! that the property holds text at all. Unknown properties and
//! non-text data types fail the query.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{HarpoonError, Result};

use super::tokenizer::Tokenization;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Text,
    TextArray,
    Int,
    Number,
    Boolean,
}

impl DataType {
    pub fn is_text(&self) -> bool {
        matches!(self, DataType::Text | DataType::TextArray)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PropertySchema {
    pub data_type: DataType,
    pub tokenization: Tokenization,
}

impl PropertySchema {
    pub fn text(tokenization: Tokenization) -> Self {
        Self {
            data_type: DataType::Text,
            tokenization,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Schema {
    properties: HashMap<String, PropertySchema>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_property(mut self, name: &str, property: PropertySchema) -> Self {
        self.properties.insert(name.to_string(), property);
        self
    }

    /// Resolve a queried property, failing on unknown names and
    /// non-text data types.
    pub fn searchable(&self, name: &str) -> Result<&PropertySchema> {
        let property = self
            .properties
            .get(name)
            .ok_or_else(|| HarpoonError::SchemaMismatch(format!("unknown property '{name}'")))?;

        if !property.data_type.is_text() {
            return Err(HarpoonError::SchemaMismatch(format!(
                "cannot handle datatype {:?} of property '{name}'",
                property.data_type
            )));
        }

        Ok(property)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_searchable_lookup() {
        let schema = Schema::new()
            .with_property("body", PropertySchema::text(Tokenization::Word))
            .with_property(
                "age",
                PropertySchema {
                    data_type: DataType::Int,
                    tokenization: Tokenization::Word,
                },
            );

        assert_eq!(
            schema.searchable("body").unwrap().tokenization,
            Tokenization::Word
        );
        assert!(matches!(
            schema.searchable("missing"),
            Err(HarpoonError::SchemaMismatch(_))
        ));
        assert!(matches!(
            schema.searchable("age"),
            Err(HarpoonError::SchemaMismatch(_))
        ));
    }
}
