//! Collection discovery.
//!
//! Resolves the set of collections a run migrates, either from an explicit
//! allow-list or by enumerating the store, and in schema-aware mode samples
//! one document per collection to infer its schema. Any store error aborts
//! discovery; nothing is dispatched from a partial result.

use futures::{StreamExt, TryStreamExt, stream};
use indexmap::IndexMap;
use snafu::prelude::*;
use tracing::{debug, info, warn};

use crate::config::TableId;
use crate::emit;
use crate::error::{
    ConfigError, DiscoveryError, EmptyIncludeSnafu, InvalidCollectionPathSnafu,
    ListCollectionsSnafu, ListDocumentsSnafu, MixedAllSnafu, SampleDocumentSnafu,
    TableConflictSnafu,
};
use crate::metrics::events::CollectionsDiscovered;
use crate::schema::{Schema, infer};
use crate::store::DocumentStore;

/// Include value selecting every top-level collection.
pub const ALL_COLLECTIONS: &str = "ALL";

/// Sample documents fetched concurrently in schema-aware mode.
const SAMPLE_CONCURRENCY: usize = 8;

/// Which collections a run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Every top-level collection not in `exclude`, plus subcollections
    /// when `recursive` is set.
    All {
        exclude: Vec<String>,
        recursive: bool,
    },
    /// Exactly these collection paths, in this order.
    Explicit(Vec<String>),
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl Selection {
    /// Parse comma separated include and exclude lists.
    ///
    /// Entries are trimmed and empty entries ignored. `exclude` and
    /// `recursive` only apply to `ALL`, which must be the only entry.
    pub fn parse(include: &str, exclude: &str, recursive: bool) -> Result<Self, ConfigError> {
        let paths = split_list(include);
        ensure!(!paths.is_empty(), EmptyIncludeSnafu);

        if paths.iter().any(|p| p == ALL_COLLECTIONS) {
            ensure!(
                paths.len() == 1,
                MixedAllSnafu {
                    include: include.trim()
                }
            );
            return Ok(Selection::All {
                exclude: split_list(exclude),
                recursive,
            });
        }

        if recursive {
            warn!("--recursive only applies to --include ALL; ignoring it");
        }
        if !exclude.trim().is_empty() {
            debug!("Exclude list ignored for an explicit include list");
        }
        Ok(Selection::Explicit(paths))
    }
}

/// One unit of work: a collection and, in schema-aware mode, its schema.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionTask {
    pub collection_path: String,
    pub schema: Option<Schema>,
}

/// A collection found by discovery.
///
/// `path` is what gets exported. When the same subcollection id exists
/// under several documents of one parent collection, `path` has a
/// `{<parent>_id}` placeholder in place of the document id and `instances`
/// holds every concrete path; otherwise `instances` is just `path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredCollection {
    pub path: String,
    pub instances: Vec<String>,
}

impl DiscoveredCollection {
    fn single(path: String) -> Self {
        Self {
            instances: vec![path.clone()],
            path,
        }
    }
}

/// Resolve the selection to an ordered list of collection paths.
///
/// Enumeration is a pre-order walk: each collection is followed by its
/// subcollections before the next sibling. Excluded collections are
/// neither returned nor descended into.
pub async fn discover(
    store: &dyn DocumentStore,
    selection: &Selection,
) -> Result<Vec<String>, DiscoveryError> {
    Ok(discover_collections(store, selection)
        .await?
        .into_iter()
        .map(|c| c.path)
        .collect())
}

/// Like [`discover`], keeping the concrete paths behind grouped
/// subcollections.
pub async fn discover_collections(
    store: &dyn DocumentStore,
    selection: &Selection,
) -> Result<Vec<DiscoveredCollection>, DiscoveryError> {
    let (exclude, recursive) = match selection {
        Selection::Explicit(paths) => {
            return Ok(paths
                .iter()
                .cloned()
                .map(DiscoveredCollection::single)
                .collect());
        }
        Selection::All { exclude, recursive } => (exclude, *recursive),
    };

    let top_level = store
        .list_collections(None)
        .await
        .context(ListCollectionsSnafu { parent: "/" })?;

    let mut collections = Vec::new();
    let mut pending: Vec<DiscoveredCollection> = top_level
        .into_iter()
        .rev()
        .map(DiscoveredCollection::single)
        .collect();

    while let Some(collection) = pending.pop() {
        if exclude.contains(&collection.path) {
            debug!(collection = %collection.path, "Excluded");
            continue;
        }

        let children = if recursive {
            subcollections(store, &collection, exclude).await?
        } else {
            Vec::new()
        };
        collections.push(collection);
        pending.extend(children.into_iter().rev());
    }

    Ok(collections)
}

/// Subcollections of every document in `parent`, grouped by id.
async fn subcollections(
    store: &dyn DocumentStore,
    parent: &DiscoveredCollection,
    exclude: &[String],
) -> Result<Vec<DiscoveredCollection>, DiscoveryError> {
    let mut groups: IndexMap<String, Vec<String>> = IndexMap::new();
    for instance in &parent.instances {
        let documents = store
            .list_document_paths(instance)
            .await
            .context(ListDocumentsSnafu {
                collection: instance.as_str(),
            })?;

        for document in documents {
            let ids = store
                .list_collections(Some(&document))
                .await
                .context(ListCollectionsSnafu {
                    parent: document.as_str(),
                })?;
            for id in ids {
                let path = format!("{document}/{id}");
                if exclude.contains(&path) {
                    debug!(collection = %path, "Excluded");
                    continue;
                }
                groups.entry(id).or_default().push(path);
            }
        }
    }

    let placeholder = parent.path.rsplit('/').next().unwrap_or_default();
    Ok(groups
        .into_iter()
        .map(|(id, mut instances)| {
            if instances.len() == 1 && !parent.path.contains('{') {
                return DiscoveredCollection::single(instances.remove(0));
            }
            let path = format!("{}/{{{placeholder}_id}}/{id}", parent.path);
            debug!(collection = %path, instances = instances.len(), "Grouped subcollections");
            DiscoveredCollection { path, instances }
        })
        .collect())
}

/// Resolve the selection to collection tasks, inferring a schema for each
/// collection when `infer_schema` is set.
///
/// Fails if two collections would export to the same table.
pub async fn discover_tasks(
    store: &dyn DocumentStore,
    selection: &Selection,
    infer_schema: bool,
) -> Result<Vec<CollectionTask>, DiscoveryError> {
    let collections = discover_collections(store, selection).await?;
    check_table_ids(&collections)?;

    let tasks: Vec<CollectionTask> = if infer_schema {
        stream::iter(collections)
            .map(|collection| async move {
                let schema = sample_schema(store, &collection).await?;
                Ok::<_, DiscoveryError>(CollectionTask {
                    collection_path: collection.path,
                    schema: Some(schema),
                })
            })
            .buffered(SAMPLE_CONCURRENCY)
            .try_collect()
            .await?
    } else {
        collections
            .into_iter()
            .map(|collection| CollectionTask {
                collection_path: collection.path,
                schema: None,
            })
            .collect()
    };

    info!(count = tasks.len(), "Discovered collections");
    emit!(CollectionsDiscovered {
        count: tasks.len() as u64
    });
    Ok(tasks)
}

/// Infer a schema from the first document found in any instance.
async fn sample_schema(
    store: &dyn DocumentStore,
    collection: &DiscoveredCollection,
) -> Result<Schema, DiscoveryError> {
    for instance in &collection.instances {
        let document = store
            .first_document(instance)
            .await
            .context(SampleDocumentSnafu {
                collection: instance.as_str(),
            })?;

        if let Some(document) = document {
            let schema = infer(&document.fields);
            debug!(
                target = %collection.path,
                document = %document.path,
                fields = schema.len(),
                "Inferred schema"
            );
            return Ok(schema);
        }
    }

    warn!(target = %collection.path, "Collection has no documents; using an empty schema");
    Ok(Schema::default())
}

fn check_table_ids(collections: &[DiscoveredCollection]) -> Result<(), DiscoveryError> {
    let mut seen: IndexMap<TableId, &str> = IndexMap::with_capacity(collections.len());
    for path in collections.iter().map(|c| &c.path) {
        let table = TableId::from_collection_path(path)
            .context(InvalidCollectionPathSnafu { path: path.as_str() })?;
        if let Some(first) = seen.get(&table) {
            return TableConflictSnafu {
                table: table.to_string(),
                first: *first,
                second: path.as_str(),
            }
            .fail();
        }
        seen.insert(table, path);
    }
    Ok(())
}
