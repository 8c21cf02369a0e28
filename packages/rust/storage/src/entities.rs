//! Verticals, brands, products, aliases and rejections.

use std::collections::BTreeMap;

use brandlens_shared::{BrandlensError, EntityType, Result, ValidationSource};
use brandlens_text::entity_key;
use libsql::params;
use serde::Serialize;

use crate::{Storage, new_id, now, storage_err};

/// A vertical (product category) scoping all knowledge rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerticalRecord {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

/// A stored brand or product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnowledgeEntity {
    pub id: String,
    pub vertical_id: String,
    pub entity_type: EntityType,
    pub canonical_name: String,
    pub display_name: String,
    pub is_validated: bool,
    pub validation_source: Option<ValidationSource>,
    pub mention_count: i64,
    pub is_user_input: bool,
    /// Owning brand, products only.
    pub brand_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedRecord {
    pub entity_type: EntityType,
    pub name: String,
    pub reason: String,
}

fn entity_table(kind: EntityType) -> &'static str {
    match kind {
        EntityType::Brand => "brands",
        EntityType::Product => "products",
    }
}

fn alias_table(kind: EntityType) -> &'static str {
    match kind {
        EntityType::Brand => "brand_aliases",
        EntityType::Product => "product_aliases",
    }
}

fn entity_columns(kind: EntityType) -> &'static str {
    match kind {
        EntityType::Brand => {
            "e.id, e.vertical_id, e.canonical_name, e.display_name, e.is_validated, \
             e.validation_source, e.mention_count, e.is_user_input, NULL"
        }
        EntityType::Product => {
            "e.id, e.vertical_id, e.canonical_name, e.display_name, e.is_validated, \
             e.validation_source, e.mention_count, e.is_user_input, e.brand_id"
        }
    }
}

fn row_to_entity(row: &libsql::Row, kind: EntityType) -> Result<KnowledgeEntity> {
    Ok(KnowledgeEntity {
        id: row.get::<String>(0).map_err(storage_err)?,
        vertical_id: row.get::<String>(1).map_err(storage_err)?,
        entity_type: kind,
        canonical_name: row.get::<String>(2).map_err(storage_err)?,
        display_name: row.get::<String>(3).map_err(storage_err)?,
        is_validated: row.get::<i64>(4).map_err(storage_err)? != 0,
        validation_source: row
            .get::<String>(5)
            .ok()
            .and_then(|s| ValidationSource::parse(&s)),
        mention_count: row.get::<i64>(6).map_err(storage_err)?,
        is_user_input: row.get::<i64>(7).map_err(storage_err)? != 0,
        brand_id: row.get::<String>(8).ok(),
    })
}

impl Storage {
    // -----------------------------------------------------------------------
    // Verticals
    // -----------------------------------------------------------------------

    /// Find a vertical by name, case-insensitively.
    pub async fn find_vertical(&self, name: &str) -> Result<Option<VerticalRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, description FROM verticals WHERE name_key = ?1",
                params![name.trim().to_lowercase()],
            )
            .await
            .map_err(storage_err)?;

        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(VerticalRecord {
                id: row.get::<String>(0).map_err(storage_err)?,
                name: row.get::<String>(1).map_err(storage_err)?,
                description: row.get::<String>(2).ok(),
            })),
            None => Ok(None),
        }
    }

    /// Find or create a vertical.
    pub async fn ensure_vertical(&self, name: &str, description: Option<&str>) -> Result<VerticalRecord> {
        let name = name.trim();
        if name.is_empty() {
            return Err(BrandlensError::validation("vertical name is empty"));
        }
        if let Some(existing) = self.find_vertical(name).await? {
            return Ok(existing);
        }
        let id = new_id();
        self.execute_write(
            "ensure_vertical",
            "INSERT INTO verticals (id, name, name_key, description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            || params![id.as_str(), name, name.to_lowercase(), description, now()],
        )
        .await?;
        tracing::info!(vertical = name, "vertical created");
        Ok(VerticalRecord {
            id,
            name: name.to_string(),
            description: description.map(str::to_string),
        })
    }

    // -----------------------------------------------------------------------
    // Brands and products
    // -----------------------------------------------------------------------

    pub async fn get_entity(&self, kind: EntityType, id: &str) -> Result<Option<KnowledgeEntity>> {
        let sql = format!(
            "SELECT {} FROM {} e WHERE e.id = ?1",
            entity_columns(kind),
            entity_table(kind)
        );
        let mut rows = self.conn.query(&sql, params![id]).await.map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_entity(&row, kind)?)),
            None => Ok(None),
        }
    }

    /// Look an entity up by its key, then by any alias key.
    pub async fn find_entity(
        &self,
        vertical_id: &str,
        kind: EntityType,
        name: &str,
    ) -> Result<Option<KnowledgeEntity>> {
        let key = entity_key(name);
        if key.is_empty() {
            return Ok(None);
        }
        let by_name = format!(
            "SELECT {} FROM {} e WHERE e.vertical_id = ?1 AND e.name_key = ?2",
            entity_columns(kind),
            entity_table(kind)
        );
        let mut rows = self
            .conn
            .query(&by_name, params![vertical_id, key.as_str()])
            .await
            .map_err(storage_err)?;
        if let Some(row) = rows.next().await.map_err(storage_err)? {
            return Ok(Some(row_to_entity(&row, kind)?));
        }

        let by_alias = format!(
            "SELECT {} FROM {} e JOIN {} a ON a.owner_id = e.id
             WHERE e.vertical_id = ?1 AND a.alias_key = ?2
             ORDER BY e.is_validated DESC, e.mention_count DESC LIMIT 1",
            entity_columns(kind),
            entity_table(kind),
            alias_table(kind)
        );
        let mut rows = self
            .conn
            .query(&by_alias, params![vertical_id, key.as_str()])
            .await
            .map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => Ok(Some(row_to_entity(&row, kind)?)),
            None => Ok(None),
        }
    }

    /// Create the entity on first sighting or add `mention_delta` to it.
    ///
    /// User-declared entities are created validated with source `user_input`.
    pub async fn upsert_entity(
        &self,
        vertical_id: &str,
        kind: EntityType,
        name: &str,
        mention_delta: i64,
        is_user_input: bool,
    ) -> Result<KnowledgeEntity> {
        self.check_writable()?;
        let name = name.trim();
        let key = entity_key(name);
        if key.is_empty() {
            return Err(BrandlensError::validation(format!("entity name '{name}' has no usable characters")));
        }
        let delta = mention_delta.max(0);
        let timestamp = now();

        if let Some(existing) = self.find_entity(vertical_id, kind, name).await? {
            let sql = format!(
                "UPDATE {} SET mention_count = mention_count + ?1,
                    is_user_input = MAX(is_user_input, ?2), updated_at = ?3
                 WHERE id = ?4",
                entity_table(kind)
            );
            self.execute_write("upsert_entity", &sql, || {
                params![delta, is_user_input as i64, timestamp.as_str(), existing.id.as_str()]
            })
            .await?;
            if is_user_input && !existing.is_validated {
                self.validate_entity(&existing, ValidationSource::UserInput).await?;
            }
            return self
                .get_entity(kind, &existing.id)
                .await?
                .ok_or_else(|| BrandlensError::Storage(format!("{} vanished during update", existing.id)));
        }

        let id = new_id();
        let source = is_user_input.then_some(ValidationSource::UserInput.as_str());
        let sql = format!(
            "INSERT INTO {} (id, vertical_id, canonical_name, display_name, name_key, is_validated,
                validation_source, mention_count, is_user_input, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3, ?4, ?5, ?6, ?7, ?5, ?8, ?8)",
            entity_table(kind)
        );
        self.execute_write("upsert_entity", &sql, || {
            params![id.as_str(), vertical_id, name, key.as_str(), is_user_input as i64, source, delta, timestamp.as_str()]
        })
        .await?;
        tracing::debug!(kind = kind.as_str(), name, "entity created");

        self.get_entity(kind, &id)
            .await?
            .ok_or_else(|| BrandlensError::Storage(format!("{id} missing after insert")))
    }

    /// Mark an entity validated.
    ///
    /// Automatic validation never overrides a rejection; feedback and user
    /// input are explicit overrides and clear it first. Returns whether the
    /// entity is now validated.
    pub async fn validate_entity(&self, entity: &KnowledgeEntity, source: ValidationSource) -> Result<bool> {
        self.check_writable()?;
        let kind = entity.entity_type;
        let rejected = self
            .is_rejected(&entity.vertical_id, kind, &entity.canonical_name)
            .await?;
        if rejected {
            if source == ValidationSource::AutoMention {
                return Ok(false);
            }
            self.unreject_entity(&entity.vertical_id, kind, &entity.canonical_name)
                .await?;
        }
        let sql = format!(
            "UPDATE {} SET is_validated = 1, validation_source = ?1, updated_at = ?2 WHERE id = ?3",
            entity_table(kind)
        );
        self.execute_write("validate_entity", &sql, || params![source.as_str(), now(), entity.id.as_str()])
            .await?;
        Ok(true)
    }

    pub async fn list_entities(
        &self,
        vertical_id: &str,
        kind: EntityType,
        validated_only: bool,
    ) -> Result<Vec<KnowledgeEntity>> {
        let sql = format!(
            "SELECT {} FROM {} e WHERE e.vertical_id = ?1 AND (?2 = 0 OR e.is_validated = 1)
             ORDER BY e.mention_count DESC, e.canonical_name",
            entity_columns(kind),
            entity_table(kind)
        );
        let mut rows = self
            .conn
            .query(&sql, params![vertical_id, validated_only as i64])
            .await
            .map_err(storage_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            out.push(row_to_entity(&row, kind)?);
        }
        Ok(out)
    }

    /// Canonical name → every surface (display name and aliases) of the
    /// validated entities of one kind.
    pub async fn validated_surfaces(
        &self,
        vertical_id: &str,
        kind: EntityType,
    ) -> Result<BTreeMap<String, Vec<String>>> {
        let sql = format!(
            "SELECT e.canonical_name, e.display_name, a.alias
             FROM {} e LEFT JOIN {} a ON a.owner_id = e.id
             WHERE e.vertical_id = ?1 AND e.is_validated = 1
             ORDER BY e.canonical_name, a.id",
            entity_table(kind),
            alias_table(kind)
        );
        let mut rows = self.conn.query(&sql, params![vertical_id]).await.map_err(storage_err)?;
        let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let canonical = row.get::<String>(0).map_err(storage_err)?;
            let display = row.get::<String>(1).map_err(storage_err)?;
            let alias = row.get::<String>(2).ok();
            let surfaces = out.entry(canonical).or_default();
            for surface in std::iter::once(display).chain(alias) {
                if !surfaces.contains(&surface) {
                    surfaces.push(surface);
                }
            }
        }
        Ok(out)
    }

    /// Link a product to its owning brand.
    pub async fn set_product_brand(&self, product_id: &str, brand_id: Option<&str>) -> Result<()> {
        self.execute_write(
            "set_product_brand",
            "UPDATE products SET brand_id = ?1, updated_at = ?2 WHERE id = ?3",
            || params![brand_id, now(), product_id],
        )
        .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Aliases
    // -----------------------------------------------------------------------

    /// Add an alias. Duplicates are no-ops; returns whether a row was added.
    pub async fn add_alias(
        &self,
        kind: EntityType,
        owner_id: &str,
        alias: &str,
        language: Option<&str>,
    ) -> Result<bool> {
        self.check_writable()?;
        let alias = alias.trim();
        if alias.is_empty() {
            return Ok(false);
        }
        let sql = format!(
            "INSERT OR IGNORE INTO {} (owner_id, alias, alias_key, language) VALUES (?1, ?2, ?3, ?4)",
            alias_table(kind)
        );
        let changed = self
            .execute_write("add_alias", &sql, || params![owner_id, alias, entity_key(alias), language])
            .await?;
        Ok(changed > 0)
    }

    pub async fn aliases_for(&self, kind: EntityType, owner_id: &str) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT alias FROM {} WHERE owner_id = ?1 ORDER BY id",
            alias_table(kind)
        );
        let mut rows = self.conn.query(&sql, params![owner_id]).await.map_err(storage_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            out.push(row.get::<String>(0).map_err(storage_err)?);
        }
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Rejections
    // -----------------------------------------------------------------------

    /// Record a negative fact and drop validation from any matching entity.
    pub async fn reject_entity(
        &self,
        vertical_id: &str,
        kind: EntityType,
        name: &str,
        reason: &str,
    ) -> Result<()> {
        self.check_writable()?;
        let key = entity_key(name);
        if key.is_empty() {
            return Err(BrandlensError::validation(format!("cannot reject '{name}'")));
        }
        self.execute_write(
            "reject_entity",
            "INSERT OR IGNORE INTO rejected_entities (id, vertical_id, entity_type, name, name_key, reason, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            || params![new_id(), vertical_id, kind.as_str(), name.trim(), key.as_str(), reason, now()],
        )
        .await?;
        let sql = format!(
            "UPDATE {} SET is_validated = 0, validation_source = NULL, updated_at = ?1
             WHERE vertical_id = ?2 AND name_key = ?3",
            entity_table(kind)
        );
        self.execute_write("reject_entity", &sql, || params![now(), vertical_id, key.as_str()])
            .await?;
        tracing::info!(kind = kind.as_str(), name, reason, "entity rejected");
        Ok(())
    }

    /// Remove a rejection. Returns whether one existed.
    pub async fn unreject_entity(&self, vertical_id: &str, kind: EntityType, name: &str) -> Result<bool> {
        let removed = self
            .execute_write(
                "unreject_entity",
                "DELETE FROM rejected_entities WHERE vertical_id = ?1 AND entity_type = ?2 AND name_key = ?3",
                || params![vertical_id, kind.as_str(), entity_key(name)],
            )
            .await?;
        Ok(removed > 0)
    }

    pub async fn is_rejected(&self, vertical_id: &str, kind: EntityType, name: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT 1 FROM rejected_entities WHERE vertical_id = ?1 AND entity_type = ?2 AND name_key = ?3",
                params![vertical_id, kind.as_str(), entity_key(name)],
            )
            .await
            .map_err(storage_err)?;
        Ok(rows.next().await.map_err(storage_err)?.is_some())
    }

    /// Rejections of one kind, or of both when `kind` is `None`, newest first.
    pub async fn list_rejected(
        &self,
        vertical_id: &str,
        kind: Option<EntityType>,
    ) -> Result<Vec<RejectedRecord>> {
        let mut rows = self
            .conn
            .query(
                "SELECT entity_type, name, reason FROM rejected_entities
                 WHERE vertical_id = ?1 AND (?2 IS NULL OR entity_type = ?2)
                 ORDER BY created_at DESC, id DESC",
                params![vertical_id, kind.map(|k| k.as_str())],
            )
            .await
            .map_err(storage_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let entity_type: EntityType = row.get::<String>(0).map_err(storage_err)?.parse()?;
            out.push(RejectedRecord {
                entity_type,
                name: row.get::<String>(1).map_err(storage_err)?,
                reason: row.get::<String>(2).map_err(storage_err)?,
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::test_storage;
    use brandlens_shared::{EntityType, ValidationSource};

    #[tokio::test]
    async fn verticals_are_case_insensitive() {
        let storage = test_storage().await;
        let a = storage.ensure_vertical("SUV", Some("family cars")).await.unwrap();
        let b = storage.ensure_vertical("suv", None).await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(b.description.as_deref(), Some("family cars"));
    }

    #[tokio::test]
    async fn entities_accumulate_mentions() {
        let storage = test_storage().await;
        let v = storage.ensure_vertical("SUV", None).await.unwrap();
        let first = storage
            .upsert_entity(&v.id, EntityType::Brand, "Toyota", 2, false)
            .await
            .unwrap();
        assert!(!first.is_validated);
        let again = storage
            .upsert_entity(&v.id, EntityType::Brand, "toyota", 3, false)
            .await
            .unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(again.mention_count, 5);
        assert_eq!(again.canonical_name, "Toyota");
    }

    #[tokio::test]
    async fn user_input_is_validated() {
        let storage = test_storage().await;
        let v = storage.ensure_vertical("SUV", None).await.unwrap();
        let vw = storage
            .upsert_entity(&v.id, EntityType::Brand, "VW", 0, true)
            .await
            .unwrap();
        assert!(vw.is_validated);
        assert!(vw.is_user_input);
        assert_eq!(vw.validation_source, Some(ValidationSource::UserInput));
    }

    #[tokio::test]
    async fn aliases_are_additive_and_resolve() {
        let storage = test_storage().await;
        let v = storage.ensure_vertical("SUV", None).await.unwrap();
        let vw = storage
            .upsert_entity(&v.id, EntityType::Brand, "VW", 1, true)
            .await
            .unwrap();
        assert!(storage.add_alias(EntityType::Brand, &vw.id, "Volkswagen", Some("en")).await.unwrap());
        assert!(!storage.add_alias(EntityType::Brand, &vw.id, "Volkswagen", None).await.unwrap());
        assert_eq!(storage.aliases_for(EntityType::Brand, &vw.id).await.unwrap(), vec!["Volkswagen"]);

        let found = storage
            .find_entity(&v.id, EntityType::Brand, "VOLKSWAGEN")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, vw.id);

        let surfaces = storage.validated_surfaces(&v.id, EntityType::Brand).await.unwrap();
        assert_eq!(surfaces["VW"], vec!["VW", "Volkswagen"]);
    }

    #[tokio::test]
    async fn rejection_blocks_automatic_validation_only() {
        let storage = test_storage().await;
        let v = storage.ensure_vertical("SUV", None).await.unwrap();
        let entity = storage
            .upsert_entity(&v.id, EntityType::Brand, "Best SUV", 5, false)
            .await
            .unwrap();
        storage
            .reject_entity(&v.id, EntityType::Brand, "best suv", "generic phrase")
            .await
            .unwrap();
        assert!(storage.is_rejected(&v.id, EntityType::Brand, "Best-SUV").await.unwrap());
        assert!(!storage.validate_entity(&entity, ValidationSource::AutoMention).await.unwrap());

        let rejected = storage.list_rejected(&v.id, Some(EntityType::Brand)).await.unwrap();
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].reason, "generic phrase");

        assert!(storage.validate_entity(&entity, ValidationSource::Feedback).await.unwrap());
        assert!(!storage.is_rejected(&v.id, EntityType::Brand, "Best SUV").await.unwrap());
    }

    #[tokio::test]
    async fn products_link_to_brands() {
        let storage = test_storage().await;
        let v = storage.ensure_vertical("SUV", None).await.unwrap();
        let brand = storage.upsert_entity(&v.id, EntityType::Brand, "Toyota", 1, false).await.unwrap();
        let product = storage.upsert_entity(&v.id, EntityType::Product, "RAV4", 1, false).await.unwrap();
        storage.set_product_brand(&product.id, Some(&brand.id)).await.unwrap();
        let product = storage.get_entity(EntityType::Product, &product.id).await.unwrap().unwrap();
        assert_eq!(product.brand_id.as_deref(), Some(brand.id.as_str()));
    }
}
