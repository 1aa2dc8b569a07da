//! User schema resource
//!
//! A user schema describes the attribute shape of an organization's users.
//! Schemas participate in the resource layer exactly like applications:
//! file-declared, database-backed, or both.

use serde::{Deserialize, Serialize};

use super::Resource;

/// A named user attribute schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSchema {
    /// Globally unique schema id
    pub id: String,

    /// Schema name
    pub name: String,

    /// JSON-schema-shaped attribute definition
    #[serde(default)]
    pub schema: serde_json::Value,

    #[serde(skip)]
    read_only: bool,
}

impl UserSchema {
    /// A schema with the given id, name, and definition
    pub fn new(id: impl Into<String>, name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            schema,
            read_only: false,
        }
    }
}

impl Resource for UserSchema {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserializes_from_yaml() {
        let yaml = r#"
id: schema-employee
name: employee
schema:
  properties:
    email:
      type: string
"#;
        let schema: UserSchema = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(schema.id, "schema-employee");
        assert_eq!(schema.name, "employee");
        assert!(schema.schema["properties"]["email"].is_object());
        assert!(!schema.is_read_only());
    }
}
