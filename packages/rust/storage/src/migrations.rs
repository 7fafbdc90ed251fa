//! SQL migration definitions for the Backlinkoo database.
//!
//! Migrations are applied in order on database open. Each migration records
//! its own version in `schema_migrations`.

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
            description: "Initial schema: campaigns, published_posts, campaign_logs",
            sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Backlink campaigns
CREATE TABLE IF NOT EXISTS campaigns (
    id             TEXT PRIMARY KEY,
    user_id        TEXT NOT NULL,
    name           TEXT NOT NULL,
    target_url     TEXT NOT NULL,
    keywords_json  TEXT NOT NULL,
    anchors_json   TEXT NOT NULL,
    status         TEXT NOT NULL DEFAULT 'draft',
    model          TEXT,
    error_message  TEXT,
    published_url  TEXT,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL,
    started_at     TEXT,
    completed_at   TEXT
);

CREATE INDEX IF NOT EXISTS idx_campaigns_user ON campaigns(user_id);
CREATE INDEX IF NOT EXISTS idx_campaigns_status ON campaigns(status);

-- Content that went live on an external platform
CREATE TABLE IF NOT EXISTS published_posts (
    id            TEXT PRIMARY KEY,
    campaign_id   TEXT NOT NULL REFERENCES campaigns(id) ON DELETE CASCADE,
    platform      TEXT NOT NULL,
    url           TEXT NOT NULL,
    title         TEXT NOT NULL,
    content_hash  TEXT NOT NULL,
    keyword       TEXT NOT NULL,
    anchor_text   TEXT NOT NULL,
    prompt_index  INTEGER NOT NULL,
    published_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_published_posts_campaign ON published_posts(campaign_id);

-- Human-readable campaign activity
CREATE TABLE IF NOT EXISTS campaign_logs (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    campaign_id  TEXT NOT NULL REFERENCES campaigns(id) ON DELETE CASCADE,
    level        TEXT NOT NULL,
    message      TEXT NOT NULL,
    created_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_campaign_logs_campaign ON campaign_logs(campaign_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Blog posts with unique slugs and trial expiry",
            sql: r#"
CREATE TABLE IF NOT EXISTS blog_posts (
    id                   TEXT PRIMARY KEY,
    slug                 TEXT NOT NULL UNIQUE,
    title                TEXT NOT NULL,
    content              TEXT NOT NULL,
    keyword              TEXT NOT NULL,
    anchor_text          TEXT NOT NULL,
    target_url           TEXT NOT NULL,
    campaign_id          TEXT REFERENCES campaigns(id) ON DELETE SET NULL,
    published_url        TEXT NOT NULL,
    word_count           INTEGER NOT NULL,
    reading_time_minutes INTEGER NOT NULL,
    is_trial             INTEGER NOT NULL DEFAULT 0,
    expires_at           TEXT,
    created_at           TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_blog_posts_expiry ON blog_posts(is_trial, expires_at);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
