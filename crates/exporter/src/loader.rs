//! Batched morph-to loading
//!
//! Owners pointing at several target models through one morph-to relation
//! are grouped by their stored morph type, and every group is fetched with a
//! single `WHERE key IN (...)` query. Only models with a registered exporter
//! are loaded.

use std::collections::HashMap;

use futures::future::try_join_all;
use morph_orm::{
    normalize_key, Connection, Loaded, ModelQuery, PolymorphicConfig, Record, RelationshipType,
};
use serde_json::Value;

use crate::error::{ExportResult, ExporterError};
use crate::registry::MorphedModelExporter;

/// What a call to `load_morphed_models` did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Queries executed, one per loaded model
    pub query_count: usize,
    /// Owners that received a target record
    pub loaded_count: usize,
    /// Models referenced by owners but without an exporter
    pub skipped_types: Vec<String>,
}

/// Owners sharing one morph type token
struct MorphGroup {
    token: String,
    owners: Vec<usize>,
    keys: Vec<Value>,
}

/// A group ready to execute
struct GroupPlan {
    model: String,
    query: ModelQuery,
    owners: Vec<usize>,
}

impl<C: 'static> MorphedModelExporter<C> {
    /// Load `relation` on every owner, one query per referenced model
    ///
    /// `owners` may be a single `Some(&mut record)`, a `&mut Vec<Record>`, or
    /// `records.iter_mut().flatten()` for collections with holes. Owners whose
    /// morph type has no exporter are left untouched; the others get either
    /// their target or an explicit absent value attached.
    pub async fn load_morphed_models<'r, I>(
        &self,
        conn: &dyn Connection,
        owners: I,
        relation: &str,
        ctx: &C,
    ) -> ExportResult<LoadSummary>
    where
        I: IntoIterator<Item = &'r mut Record>,
    {
        let mut owners: Vec<&'r mut Record> = owners.into_iter().collect();
        let mut summary = LoadSummary::default();

        if owners.is_empty() || !self.has_exporters() {
            return Ok(summary);
        }

        let morph = self.morph_to_config(owners[0].model(), relation)?;
        let groups = group_by_morph_type(&owners, &morph);

        let mut plans = Vec::with_capacity(groups.len());
        for group in groups {
            let model = self.schema.resolve_morph_type(&group.token).to_string();

            if self.get_model_exporter(&model)?.is_none() {
                if self.options.strict_morph_types {
                    tracing::warn!(
                        "No morphed model exporter for {} referenced by '{}'",
                        model,
                        relation
                    );
                    return Err(ExporterError::Configuration(format!(
                        "no morphed model exporter registered for '{}'",
                        model
                    )));
                }

                tracing::debug!(
                    "Skipping {} owners of morph type {}: no exporter",
                    group.owners.len(),
                    model
                );
                summary.skipped_types.push(model);
                continue;
            }

            let query = self.build_query(&model, group.keys, ctx)?;

            if self.options.parallel_queries {
                plans.push(GroupPlan {
                    model,
                    query,
                    owners: group.owners,
                });
                continue;
            }

            tracing::debug!("Loading morphed {} records: {}", model, query.to_sql());
            let targets = query.get_keyed(conn, &self.schema).await?;
            summary.query_count += 1;
            summary.loaded_count +=
                attach(&mut owners, &group.owners, relation, &morph, &targets, &model);
        }

        if !plans.is_empty() {
            tracing::debug!("Loading {} morphed groups concurrently", plans.len());
            let results = try_join_all(
                plans
                    .iter()
                    .map(|plan| plan.query.get_keyed(conn, &self.schema)),
            )
            .await?;

            for (plan, targets) in plans.iter().zip(results) {
                summary.query_count += 1;
                summary.loaded_count +=
                    attach(&mut owners, &plan.owners, relation, &morph, &targets, &plan.model);
            }
        }

        Ok(summary)
    }

    fn morph_to_config(&self, model: &str, relation: &str) -> ExportResult<PolymorphicConfig> {
        self.schema
            .relationship(model, relation)
            .filter(|meta| meta.relationship_type == RelationshipType::MorphTo)
            .and_then(|meta| meta.polymorphic().ok())
            .cloned()
            .ok_or_else(|| ExporterError::invalid_relationship(relation))
    }
}

/// Group owner indices by morph type, in first-appearance order
fn group_by_morph_type(owners: &[&mut Record], morph: &PolymorphicConfig) -> Vec<MorphGroup> {
    let mut groups: Vec<MorphGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (position, owner) in owners.iter().enumerate() {
        let Some(token) = owner
            .get(&morph.type_column)
            .and_then(normalize_key)
            .filter(|t| !t.is_empty())
        else {
            continue;
        };

        let slot = *index.entry(token.clone()).or_insert_with(|| {
            groups.push(MorphGroup {
                token,
                owners: Vec::new(),
                keys: Vec::new(),
            });
            groups.len() - 1
        });

        let group = &mut groups[slot];
        group.owners.push(position);

        if let Some(key) = owner.get(&morph.id_column).filter(|v| !v.is_null()) {
            let normalized = normalize_key(key);
            if !group.keys.iter().any(|k| normalize_key(k) == normalized) {
                group.keys.push(key.clone());
            }
        }
    }

    groups
}

/// Attach fetched targets to a group's owners; returns how many matched
fn attach(
    owners: &mut [&mut Record],
    positions: &[usize],
    relation: &str,
    morph: &PolymorphicConfig,
    targets: &HashMap<String, Record>,
    model: &str,
) -> usize {
    let mut matched = 0;

    for &position in positions {
        let owner = &mut *owners[position];
        let target = owner
            .get(&morph.id_column)
            .and_then(normalize_key)
            .and_then(|key| targets.get(&key))
            .cloned();

        if target.is_some() {
            matched += 1;
        } else {
            tracing::warn!(
                "Dangling morph reference on {}.{}: no {} with key {:?}",
                owner.model(),
                relation,
                model,
                owner.get(&morph.id_column)
            );
        }

        owner.set_relation(relation, Loaded::one(target));
    }

    matched
}
