//! Subcommand execution.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use crudguard_core::config::DEFAULT_RESERVED_PREFIX;
use crudguard_core::security::{
    redact_document, Action, HookContext, Identity, PermissionResolver, ProjectionMask,
    SecurityPolicy,
};
use crudguard_core::{AssociationQueryPlanner, Catalog, GuardConfig};
use crudguard_proto::Filter;
use crudguard_store::{DocumentStore, GuardedCollection, StoreConfig};
use serde_json::{Map, Value};
use tracing::info;

use crate::{CallerArgs, Command, StoreArgs};

/// Execute a subcommand, returning its JSON output.
pub async fn run(command: Command) -> Result<Value> {
    match command {
        Command::Resolve { caller, action } => resolve(&caller, action.as_deref()),
        Command::Plan {
            catalog,
            entity,
            projection,
            depth,
        } => plan(&catalog, &entity, projection.as_deref(), depth),
        Command::Redact { caller, document } => redact(&caller, document.as_deref()),
        Command::Import { store, file } => import(&store, &file),
        Command::Find {
            store,
            caller,
            filter,
            limit,
        } => find(&store, &caller, filter.as_deref(), limit).await,
    }
}

/// Format command output.
pub fn render(output: &Value, compact: bool) -> String {
    let rendered = if compact {
        serde_json::to_string(output)
    } else {
        serde_json::to_string_pretty(output)
    };
    rendered.unwrap_or_else(|_| output.to_string())
}

/// Parse a `key=value` identity attribute.
///
/// The value is read as JSON when it parses, otherwise kept as a string.
pub fn parse_attribute(s: &str) -> Result<(String, Value), String> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid attribute '{}': expected key=value", s))?;
    if key.is_empty() {
        return Err(format!("invalid attribute '{}': empty key", s));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

fn resolve(caller: &CallerArgs, action: Option<&str>) -> Result<Value> {
    let resolver = resolver(caller)?;
    let identity = identity(caller);

    let actions = match action {
        Some(action) => vec![action.parse::<Action>()?],
        None => Action::ALL.to_vec(),
    };

    let mut output = Map::new();
    for action in actions {
        let permission = resolver.resolve(identity.as_ref(), action)?;
        output.insert(action.as_str().to_string(), serde_json::to_value(&permission)?);
    }
    Ok(Value::Object(output))
}

fn plan(catalog: &Path, entity: &str, projection: Option<&str>, depth: usize) -> Result<Value> {
    let raw = std::fs::read_to_string(catalog)
        .with_context(|| format!("reading catalog {}", catalog.display()))?;
    let catalog: Catalog = serde_json::from_str(&raw).context("parsing catalog")?;

    let mask = projection.map(ProjectionMask::decode).unwrap_or_default();
    let tree = AssociationQueryPlanner::new(&catalog).query_options_for_mask(entity, &mask, depth)?;
    Ok(serde_json::to_value(&tree)?)
}

fn redact(caller: &CallerArgs, document: Option<&Path>) -> Result<Value> {
    let raw = match document {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading document {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let mut document: Value = serde_json::from_str(&raw).context("parsing document")?;

    let permission = resolver(caller)?.require(identity(caller).as_ref(), Action::Read)?;
    if let Some(mask) = permission.projection() {
        redact_document(&mut document, mask, DEFAULT_RESERVED_PREFIX);
    }
    Ok(document)
}

fn import(store: &StoreArgs, file: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("reading documents {}", file.display()))?;
    let documents: Vec<Value> = serde_json::from_str(&raw).context("parsing documents")?;

    let db = DocumentStore::open(StoreConfig::new(&store.data))?;
    let collection = db.collection(&store.collection)?;
    let mut imported = 0usize;
    for document in documents {
        collection.insert(document)?;
        imported += 1;
    }
    db.flush()?;

    info!(collection = %store.collection, imported, "imported documents");
    Ok(serde_json::json!({ "imported": imported }))
}

async fn find(
    store: &StoreArgs,
    caller: &CallerArgs,
    filter: Option<&str>,
    limit: Option<usize>,
) -> Result<Value> {
    let filter = filter
        .map(serde_json::from_str::<Filter>)
        .transpose()
        .context("parsing filter")?;

    let db = DocumentStore::open(StoreConfig::new(&store.data))?;
    let collection = GuardedCollection::new(
        db.collection(&store.collection)?,
        resolver(caller)?,
        GuardConfig::default(),
    );

    let identity = identity(caller);
    let ctx = match &identity {
        Some(identity) => HookContext::new(identity),
        None => HookContext::internal(),
    };
    let documents = collection.find(ctx, filter, Vec::new(), limit).await?;
    Ok(Value::Array(documents))
}

fn resolver(caller: &CallerArgs) -> Result<PermissionResolver> {
    let policy = match &caller.policy {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading policy {}", path.display()))?;
            Some(Arc::new(SecurityPolicy::from_json(&raw)?))
        }
        None => None,
    };
    if policy.is_none() && !caller.roles.is_empty() {
        bail!("--policy is required when a role is given");
    }
    Ok(PermissionResolver::new(caller.entity.clone(), policy))
}

/// No roles means a trusted call.
fn identity(caller: &CallerArgs) -> Option<Identity> {
    if caller.roles.is_empty() {
        return None;
    }
    let identity = caller
        .attributes
        .iter()
        .fold(Identity::new(caller.roles.iter().cloned()), |identity, (key, value)| {
            identity.with_attribute(key.clone(), value.clone())
        });
    Some(identity)
}
