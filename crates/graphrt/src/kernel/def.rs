use std::collections::BTreeMap;

use crate::error::RegistryError;
use crate::schema::canonical_domain;
use crate::types::DataType;

/// Describes which nodes a kernel can execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelDef {
    op_type: String,
    domain: String,
    since_version: u32,
    end_version: Option<u32>,
    provider: String,
    type_constraints: BTreeMap<String, Vec<DataType>>,
}

impl KernelDef {
    pub fn builder(op_type: &str) -> KernelDefBuilder {
        KernelDefBuilder {
            def: KernelDef {
                op_type: op_type.to_string(),
                domain: canonical_domain("").to_string(),
                since_version: 1,
                end_version: None,
                provider: String::new(),
                type_constraints: BTreeMap::new(),
            },
        }
    }

    pub fn op_type(&self) -> &str {
        &self.op_type
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn since_version(&self) -> u32 {
        self.since_version
    }

    /// Last opset version covered, inclusive. `None` leaves the range open.
    pub fn end_version(&self) -> Option<u32> {
        self.end_version
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn type_constraints(&self) -> &BTreeMap<String, Vec<DataType>> {
        &self.type_constraints
    }

    /// Whether a node resolved at `version` falls inside this kernel's range.
    pub fn covers(&self, version: u32) -> bool {
        self.since_version <= version && self.end_version.map_or(true, |end| version <= end)
    }

    pub(crate) fn same_slot(&self, other: &KernelDef) -> bool {
        self.op_type == other.op_type
            && self.domain == other.domain
            && self.provider == other.provider
            && self.since_version == other.since_version
    }
}

#[derive(Debug, Clone)]
pub struct KernelDefBuilder {
    def: KernelDef,
}

impl KernelDefBuilder {
    pub fn domain(mut self, domain: &str) -> Self {
        self.def.domain = canonical_domain(domain).to_string();
        self
    }

    pub fn since_version(mut self, version: u32) -> Self {
        self.def.since_version = version;
        self.def.end_version = None;
        self
    }

    /// Inclusive version range `[since, end]`.
    pub fn version_range(mut self, since: u32, end: u32) -> Self {
        self.def.since_version = since;
        self.def.end_version = Some(end);
        self
    }

    pub fn provider(mut self, provider: &str) -> Self {
        self.def.provider = provider.to_string();
        self
    }

    /// Restricts a schema type parameter (e.g. `T`) to the listed types.
    pub fn type_constraint(mut self, type_param: &str, allowed: Vec<DataType>) -> Self {
        self.def
            .type_constraints
            .insert(type_param.to_string(), allowed);
        self
    }

    pub fn build(self) -> Result<KernelDef, RegistryError> {
        if self.def.provider.is_empty() {
            return Err(RegistryError::MissingProvider(self.def.op_type));
        }
        Ok(self.def)
    }
}
