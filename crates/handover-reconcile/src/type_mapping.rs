//! Source resource type → target type token.
//!
//! Catalog format (TOML):
//!
//! ```toml
//! [providers.aws]
//! aws_s3_bucket = "aws:s3/bucket:Bucket"
//! aws_vpc = "aws:ec2/vpc:Vpc"
//! ```

use crate::identity::{MatchContext, derive_expected_identifier};
use crate::inventory::ResourceDescriptor;
use serde::Deserialize;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum TypeMappingError {
    #[error("no target type known for `{kind}` (provider `{provider}`)")]
    NoMapping { provider: String, kind: String },

    #[error("address `{address}` is not in the live inventory of group `{group}`")]
    UnknownAddress { group: String, address: String },

    #[error("failed to read type catalog {path}: {message}")]
    Read { path: String, message: String },

    #[error("invalid toml at {path}: {source}")]
    Toml {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

pub trait TypeMapper {
    fn target_type(&self, provider: &str, kind: &str) -> Result<String, TypeMappingError>;
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    providers: BTreeMap<String, BTreeMap<String, String>>,
}

/// Static lookup table loaded from a TOML catalog.
#[derive(Debug, Clone, Default)]
pub struct CatalogTypeMapper {
    providers: BTreeMap<String, BTreeMap<String, String>>,
}

impl CatalogTypeMapper {
    pub fn from_toml_str(origin: &str, text: &str) -> Result<Self, TypeMappingError> {
        let file: CatalogFile = toml::from_str(text).map_err(|source| TypeMappingError::Toml {
            path: origin.to_string(),
            source,
        })?;
        Ok(Self {
            providers: file.providers,
        })
    }

    pub fn load(path: &Path) -> Result<Self, TypeMappingError> {
        let text = fs::read_to_string(path).map_err(|e| TypeMappingError::Read {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let mapper = Self::from_toml_str(&path.display().to_string(), &text)?;
        tracing::debug!(
            path = %path.display(),
            providers = mapper.providers.len(),
            "loaded type catalog"
        );
        Ok(mapper)
    }
}

impl TypeMapper for CatalogTypeMapper {
    fn target_type(&self, provider: &str, kind: &str) -> Result<String, TypeMappingError> {
        self.providers
            .get(provider)
            .and_then(|kinds| kinds.get(kind))
            .cloned()
            .ok_or_else(|| TypeMappingError::NoMapping {
                provider: provider.to_string(),
                kind: kind.to_string(),
            })
    }
}

/// Memoizes successful lookups of any mapper for the life of the value.
#[derive(Debug)]
pub struct CachedTypeMapper<M> {
    inner: M,
    cache: RefCell<BTreeMap<(String, String), String>>,
}

impl<M: TypeMapper> CachedTypeMapper<M> {
    pub fn new(inner: M) -> Self {
        Self {
            inner,
            cache: RefCell::new(BTreeMap::new()),
        }
    }

    pub fn cached_len(&self) -> usize {
        self.cache.borrow().len()
    }
}

impl<M: TypeMapper> TypeMapper for CachedTypeMapper<M> {
    fn target_type(&self, provider: &str, kind: &str) -> Result<String, TypeMappingError> {
        let key = (provider.to_string(), kind.to_string());
        if let Some(token) = self.cache.borrow().get(&key) {
            return Ok(token.clone());
        }
        let token = self.inner.target_type(provider, kind)?;
        self.cache.borrow_mut().insert(key, token.clone());
        Ok(token)
    }
}

/// Identifier the target system would give `resource` once imported.
pub fn derive_identifier(
    mapper: &dyn TypeMapper,
    ctx: &MatchContext,
    resource: &ResourceDescriptor,
) -> Result<String, TypeMappingError> {
    let token = mapper.target_type(&resource.provider_namespace, &resource.kind)?;
    Ok(derive_expected_identifier(
        &ctx.project,
        &ctx.group,
        &token,
        &resource.logical_name(),
    ))
}

/// Derive the identifier for the live resource at `address`.
pub fn derive_identifier_for_address(
    mapper: &dyn TypeMapper,
    ctx: &MatchContext,
    inventory: &[ResourceDescriptor],
    address: &str,
) -> Result<String, TypeMappingError> {
    let resource = inventory
        .iter()
        .find(|resource| resource.address == address)
        .ok_or_else(|| TypeMappingError::UnknownAddress {
            group: ctx.group.clone(),
            address: address.to_string(),
        })?;
    derive_identifier(mapper, ctx, resource)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use std::cell::Cell;

    const CATALOG: &str = r#"
[providers.aws]
aws_s3_bucket = "aws:s3/bucket:Bucket"
aws_vpc = "aws:ec2/vpc:Vpc"
"#;

    struct CountingMapper {
        calls: Cell<usize>,
    }

    impl TypeMapper for CountingMapper {
        fn target_type(&self, _provider: &str, kind: &str) -> Result<String, TypeMappingError> {
            self.calls.set(self.calls.get() + 1);
            Ok(format!("test:{kind}"))
        }
    }

    #[test]
    fn catalog_lookup_and_missing_kind() {
        let mapper = CatalogTypeMapper::from_toml_str("catalog.toml", CATALOG).expect("catalog");
        assert_eq!(
            mapper.target_type("aws", "aws_vpc").expect("known kind"),
            "aws:ec2/vpc:Vpc"
        );
        let err = mapper
            .target_type("aws", "aws_lambda_function")
            .expect_err("unknown kind");
        assert!(matches!(
            err,
            TypeMappingError::NoMapping { kind, .. } if kind == "aws_lambda_function"
        ));
    }

    #[test]
    fn malformed_catalog_is_a_toml_error() {
        let err = CatalogTypeMapper::from_toml_str("bad.toml", "[providers.aws\n")
            .expect_err("malformed toml");
        assert!(matches!(err, TypeMappingError::Toml { .. }));
    }

    #[test]
    fn cache_memoizes_per_kind() {
        let cached = CachedTypeMapper::new(CountingMapper { calls: Cell::new(0) });
        for _ in 0..3 {
            cached.target_type("aws", "aws_vpc").expect("mapped");
        }
        cached.target_type("aws", "aws_s3_bucket").expect("mapped");
        assert_eq!(cached.inner.calls.get(), 2);
        assert_eq!(cached.cached_len(), 2);
    }

    fn counted_logs_bucket() -> ResourceDescriptor {
        ResourceDescriptor {
            address: "aws_s3_bucket.logs[1]".to_string(),
            kind: "aws_s3_bucket".to_string(),
            name: "logs".to_string(),
            index: Some("1".to_string()),
            provider_namespace: "aws".to_string(),
            is_managed: true,
            attributes: Map::new(),
        }
    }

    #[test]
    fn derived_identifier_uses_logical_name() {
        let mapper = CatalogTypeMapper::from_toml_str("catalog.toml", CATALOG).expect("catalog");
        let ctx = MatchContext::new("shop", "dev");
        let identifier =
            derive_identifier(&mapper, &ctx, &counted_logs_bucket()).expect("identifier");
        assert_eq!(
            identifier,
            "urn:pulumi:dev::shop::aws:s3/bucket:Bucket::logs-1"
        );
    }

    #[test]
    fn derivation_by_address_requires_a_live_resource() {
        let mapper = CatalogTypeMapper::from_toml_str("catalog.toml", CATALOG).expect("catalog");
        let ctx = MatchContext::new("shop", "dev");
        let inventory = vec![counted_logs_bucket()];

        let identifier =
            derive_identifier_for_address(&mapper, &ctx, &inventory, "aws_s3_bucket.logs[1]")
                .expect("live address derives");
        assert!(identifier.ends_with("::logs-1"));

        let err = derive_identifier_for_address(&mapper, &ctx, &inventory, "aws_vpc.main")
            .expect_err("unknown address");
        assert_eq!(
            err.to_string(),
            "address `aws_vpc.main` is not in the live inventory of group `dev`"
        );
    }
}
