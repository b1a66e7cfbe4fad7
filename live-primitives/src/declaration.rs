//! Function declarations advertised to the model during capability negotiation.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

const MAX_NAME_LEN: usize = 64;
const OBJECT_TYPE: &str = "object";

/// JSON-schema style description of a function's parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    properties: Map<String, Value>,
    #[serde(default)]
    required: Vec<String>,
}

impl Default for ParameterSchema {
    fn default() -> Self {
        Self::object()
    }
}

impl ParameterSchema {
    /// Creates an empty `object` schema.
    #[must_use]
    pub fn object() -> Self {
        Self {
            kind: OBJECT_TYPE.to_owned(),
            properties: Map::new(),
            required: Vec::new(),
        }
    }

    /// Adds an optional property described by the supplied JSON schema.
    #[must_use]
    pub fn property(mut self, name: impl Into<String>, schema: Value) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    /// Adds a property and marks it as required.
    #[must_use]
    pub fn required_property(mut self, name: impl Into<String>, schema: Value) -> Self {
        let name = name.into();
        if !self.required.contains(&name) {
            self.required.push(name.clone());
        }
        self.properties.insert(name, schema);
        self
    }

    /// Returns the schema type (always `object` for valid schemas).
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Returns the property schemas keyed by parameter name.
    #[must_use]
    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    /// Returns the names of required parameters.
    #[must_use]
    pub fn required(&self) -> &[String] {
        &self.required
    }

    fn validate(&self, owner: &str) -> Result<()> {
        if self.kind != OBJECT_TYPE {
            return Err(Error::InvalidDeclaration {
                name: owner.to_owned(),
                reason: format!("parameters type must be `object`, found `{}`", self.kind),
            });
        }

        if let Some(missing) = self
            .required
            .iter()
            .find(|name| !self.properties.contains_key(name.as_str()))
        {
            return Err(Error::InvalidDeclaration {
                name: owner.to_owned(),
                reason: format!("required parameter `{missing}` has no property schema"),
            });
        }

        Ok(())
    }
}

/// Name, purpose, and parameter schema of one externally callable operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    name: String,
    description: String,
    #[serde(default)]
    parameters: ParameterSchema,
}

impl FunctionDeclaration {
    /// Starts building a declaration for the supplied operation name.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> FunctionDeclarationBuilder {
        FunctionDeclarationBuilder {
            name: name.into(),
            description: None,
            parameters: ParameterSchema::object(),
        }
    }

    /// Returns the operation name the model uses to call this function.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the free-form description shown to the model.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the parameter schema.
    #[must_use]
    pub fn parameters(&self) -> &ParameterSchema {
        &self.parameters
    }

    /// Checks the declaration shape.
    ///
    /// Declarations that arrive through deserialization bypass the builder, so
    /// callers accepting them should validate before use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDeclarationName`] or [`Error::InvalidDeclaration`]
    /// when the name, description, or parameter schema is malformed.
    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        if self.description.trim().is_empty() {
            return Err(Error::InvalidDeclaration {
                name: self.name.clone(),
                reason: "description cannot be empty".into(),
            });
        }
        self.parameters.validate(&self.name)
    }
}

/// Builder for [`FunctionDeclaration`].
pub struct FunctionDeclarationBuilder {
    name: String,
    description: Option<String>,
    parameters: ParameterSchema,
}

impl FunctionDeclarationBuilder {
    /// Sets the description shown to the model.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Replaces the parameter schema.
    #[must_use]
    pub fn parameters(mut self, parameters: ParameterSchema) -> Self {
        self.parameters = parameters;
        self
    }

    /// Finalises the declaration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDeclaration`] if the description is missing or
    /// the declaration fails [`FunctionDeclaration::validate`].
    pub fn build(self) -> Result<FunctionDeclaration> {
        let description = self.description.ok_or_else(|| Error::InvalidDeclaration {
            name: self.name.clone(),
            reason: "description must be provided".into(),
        })?;

        let declaration = FunctionDeclaration {
            name: self.name,
            description,
            parameters: self.parameters,
        };
        declaration.validate()?;
        Ok(declaration)
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidDeclarationName {
            name: String::new(),
            reason: "name cannot be empty".into(),
        });
    }

    if name.len() > MAX_NAME_LEN {
        return Err(Error::InvalidDeclarationName {
            name: name.into(),
            reason: format!("name length must be <= {MAX_NAME_LEN}"),
        });
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(Error::InvalidDeclarationName {
            name: name.into(),
            reason: "name must contain ASCII alphanumeric, underscore, dash, or dot".into(),
        });
    }

    Ok(())
}

/// Result of a plugin's `describe`: one declaration or an ordered sequence.
///
/// Serializes as a bare JSON object or a JSON array respectively.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Declarations {
    /// A plugin exposing a single operation.
    Single(FunctionDeclaration),
    /// A plugin exposing several externally named operations.
    Many(Vec<FunctionDeclaration>),
}

impl Declarations {
    /// Iterates over the contained declarations in order.
    pub fn iter(&self) -> impl Iterator<Item = &FunctionDeclaration> {
        let slice = match self {
            Self::Single(declaration) => std::slice::from_ref(declaration),
            Self::Many(declarations) => declarations.as_slice(),
        };
        slice.iter()
    }

    /// Returns the operation names of every contained declaration.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.iter().map(FunctionDeclaration::name).collect()
    }

    /// Returns the number of contained declarations.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Many(declarations) => declarations.len(),
        }
    }

    /// Returns `true` when the sequence form holds no declarations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Validates every declaration and rejects empty or ambiguous sets.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDeclarationSet`] for an empty sequence or
    /// duplicate operation names, and propagates per-declaration failures.
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::InvalidDeclarationSet {
                reason: "at least one declaration must be provided".into(),
            });
        }

        let mut seen = BTreeSet::new();
        for declaration in self.iter() {
            declaration.validate()?;
            if !seen.insert(declaration.name()) {
                return Err(Error::InvalidDeclarationSet {
                    reason: format!("operation `{}` is declared twice", declaration.name()),
                });
            }
        }
        Ok(())
    }
}

impl From<FunctionDeclaration> for Declarations {
    fn from(value: FunctionDeclaration) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<FunctionDeclaration>> for Declarations {
    fn from(value: Vec<FunctionDeclaration>) -> Self {
        Self::Many(value)
    }
}

/// One element of the declaration aggregate: the owning registry key and
/// whatever that plugin's `describe` returned.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeclarationEntry {
    /// Registry key of the owning plugin.
    pub name: String,
    /// Declaration payload returned by the plugin.
    pub declaration: Declarations,
}
