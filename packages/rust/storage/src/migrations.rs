//! SQL migration definitions for the Brandlens knowledge store.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "Knowledge schema: verticals, brands, products, aliases, rejections, mappings",
            sql: r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS verticals (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    name_key    TEXT NOT NULL UNIQUE,
    description TEXT,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS brands (
    id                TEXT PRIMARY KEY,
    vertical_id       TEXT NOT NULL REFERENCES verticals(id) ON DELETE CASCADE,
    canonical_name    TEXT NOT NULL,
    display_name      TEXT NOT NULL,
    name_key          TEXT NOT NULL,
    is_validated      INTEGER NOT NULL DEFAULT 0,
    validation_source TEXT,
    mention_count     INTEGER NOT NULL DEFAULT 0,
    is_user_input     INTEGER NOT NULL DEFAULT 0,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL,
    UNIQUE(vertical_id, name_key)
);

CREATE TABLE IF NOT EXISTS products (
    id                TEXT PRIMARY KEY,
    vertical_id       TEXT NOT NULL REFERENCES verticals(id) ON DELETE CASCADE,
    brand_id          TEXT REFERENCES brands(id) ON DELETE SET NULL,
    canonical_name    TEXT NOT NULL,
    display_name      TEXT NOT NULL,
    name_key          TEXT NOT NULL,
    is_validated      INTEGER NOT NULL DEFAULT 0,
    validation_source TEXT,
    mention_count     INTEGER NOT NULL DEFAULT 0,
    is_user_input     INTEGER NOT NULL DEFAULT 0,
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL,
    UNIQUE(vertical_id, name_key)
);

CREATE TABLE IF NOT EXISTS brand_aliases (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id  TEXT NOT NULL REFERENCES brands(id) ON DELETE CASCADE,
    alias     TEXT NOT NULL,
    alias_key TEXT NOT NULL,
    language  TEXT,
    UNIQUE(owner_id, alias)
);

CREATE INDEX IF NOT EXISTS idx_brand_aliases_key ON brand_aliases(alias_key);

CREATE TABLE IF NOT EXISTS product_aliases (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id  TEXT NOT NULL REFERENCES products(id) ON DELETE CASCADE,
    alias     TEXT NOT NULL,
    alias_key TEXT NOT NULL,
    language  TEXT,
    UNIQUE(owner_id, alias)
);

CREATE INDEX IF NOT EXISTS idx_product_aliases_key ON product_aliases(alias_key);

CREATE TABLE IF NOT EXISTS rejected_entities (
    id          TEXT PRIMARY KEY,
    vertical_id TEXT NOT NULL REFERENCES verticals(id) ON DELETE CASCADE,
    entity_type TEXT NOT NULL,
    name        TEXT NOT NULL,
    name_key    TEXT NOT NULL,
    reason      TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    UNIQUE(vertical_id, entity_type, name_key)
);

CREATE TABLE IF NOT EXISTS product_brand_mappings (
    id            TEXT PRIMARY KEY,
    vertical_id   TEXT NOT NULL REFERENCES verticals(id) ON DELETE CASCADE,
    product_id    TEXT NOT NULL REFERENCES products(id) ON DELETE CASCADE,
    brand_id      TEXT NOT NULL REFERENCES brands(id) ON DELETE CASCADE,
    source        TEXT NOT NULL,
    support_count INTEGER NOT NULL DEFAULT 0,
    confidence    REAL NOT NULL DEFAULT 0,
    is_validated  INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    UNIQUE(product_id, brand_id)
);

CREATE INDEX IF NOT EXISTS idx_mappings_product ON product_brand_mappings(product_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "LLM response cache, audit runs and review items",
            sql: r#"
CREATE TABLE IF NOT EXISTS llm_cache (
    id            TEXT PRIMARY KEY,
    task_type     TEXT NOT NULL,
    prompt_hash   TEXT NOT NULL,
    model_id      TEXT NOT NULL,
    response_text TEXT NOT NULL,
    tokens_in     INTEGER NOT NULL DEFAULT 0,
    tokens_out    INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL,
    UNIQUE(task_type, prompt_hash, model_id)
);

CREATE TABLE IF NOT EXISTS audit_runs (
    id          TEXT PRIMARY KEY,
    vertical_id TEXT NOT NULL REFERENCES verticals(id) ON DELETE CASCADE,
    status      TEXT NOT NULL,
    dry_run     INTEGER NOT NULL DEFAULT 0,
    tokens_in   INTEGER NOT NULL DEFAULT 0,
    tokens_out  INTEGER NOT NULL DEFAULT 0,
    report_json TEXT,
    error       TEXT,
    created_at  TEXT NOT NULL,
    finished_at TEXT
);

CREATE TABLE IF NOT EXISTS review_items (
    id               TEXT PRIMARY KEY,
    audit_run_id     TEXT NOT NULL REFERENCES audit_runs(id) ON DELETE CASCADE,
    llm_answer_id    TEXT NOT NULL,
    category         TEXT NOT NULL,
    action           TEXT NOT NULL,
    confidence_level TEXT NOT NULL,
    confidence_score REAL NOT NULL,
    reason           TEXT NOT NULL,
    evidence_quote   TEXT NOT NULL,
    feedback_payload TEXT NOT NULL,
    status           TEXT NOT NULL,
    created_at       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_review_items_run ON review_items(audit_run_id);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
