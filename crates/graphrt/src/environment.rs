use std::sync::Arc;

use crate::schema::OpSchemaRegistry;

/// Process-level context shared by sessions: the standard operator schemas.
#[derive(Debug, Clone)]
pub struct Environment {
    standard_schemas: Arc<OpSchemaRegistry>,
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            standard_schemas: Arc::new(OpSchemaRegistry::standard()),
        }
    }

    /// Environment resolving against `schemas` instead of the built-in operator set.
    pub fn with_schemas(schemas: OpSchemaRegistry) -> Self {
        Environment {
            standard_schemas: Arc::new(schemas),
        }
    }

    pub fn standard_schemas(&self) -> &Arc<OpSchemaRegistry> {
        &self.standard_schemas
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
