use rusqlite::Connection;

use crate::StoreError;

/// `previous` keeps the stored form: `owner_hash`, or a bare hash for rows
/// written before keys were owner-qualified. Children are not stored; they are
/// read back through `idx_revisions_previous`.
pub(crate) fn migrate(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS revisions (
            owner TEXT NOT NULL,
            hash TEXT NOT NULL,
            previous TEXT,
            revision_type TEXT NOT NULL,
            local_timestamp TEXT NOT NULL,
            has_content INTEGER NOT NULL DEFAULT 0,
            leaves TEXT NOT NULL DEFAULT '[]',
            obsolete INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (owner, hash)
        );
        CREATE INDEX IF NOT EXISTS idx_revisions_previous ON revisions(previous);

        CREATE TABLE IF NOT EXISTS signatures (
            owner TEXT NOT NULL,
            hash TEXT NOT NULL,
            digest TEXT NOT NULL,
            wallet_address TEXT NOT NULL,
            public_key TEXT NOT NULL,
            signature_type TEXT NOT NULL,
            reference_count INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (owner, hash)
        );

        CREATE TABLE IF NOT EXISTS witnesses (
            owner TEXT NOT NULL,
            hash TEXT NOT NULL,
            merkle_root TEXT NOT NULL,
            reference_count INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (owner, hash)
        );
        CREATE INDEX IF NOT EXISTS idx_witnesses_root ON witnesses(merkle_root);

        CREATE TABLE IF NOT EXISTS witness_events (
            merkle_root TEXT PRIMARY KEY,
            timestamp TEXT NOT NULL,
            network TEXT NOT NULL,
            contract_address TEXT NOT NULL,
            transaction_hash TEXT NOT NULL,
            sender_account_address TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS links (
            owner TEXT NOT NULL,
            hash TEXT NOT NULL,
            link_type TEXT NOT NULL,
            verification_hashes TEXT NOT NULL,
            file_hashes TEXT NOT NULL,
            reference_count INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (owner, hash)
        );

        CREATE TABLE IF NOT EXISTS aqua_forms (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner TEXT NOT NULL,
            hash TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            field_type TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_aqua_forms_key ON aqua_forms(owner, hash);

        CREATE TABLE IF NOT EXISTS files (
            file_hash TEXT PRIMARY KEY,
            location TEXT NOT NULL,
            size INTEGER NOT NULL,
            reference_count INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS file_index (
            file_hash TEXT NOT NULL,
            owner TEXT NOT NULL,
            hash TEXT NOT NULL,
            PRIMARY KEY (file_hash, owner, hash)
        );
        CREATE INDEX IF NOT EXISTS idx_file_index_member ON file_index(owner, hash);

        CREATE TABLE IF NOT EXISTS file_names (
            owner TEXT NOT NULL,
            hash TEXT NOT NULL,
            name TEXT NOT NULL,
            PRIMARY KEY (owner, hash)
        );

        CREATE TABLE IF NOT EXISTS latest (
            owner TEXT NOT NULL,
            hash TEXT NOT NULL,
            template_id TEXT,
            is_workflow INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (owner, hash)
        );

        CREATE TABLE IF NOT EXISTS contracts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            sender TEXT NOT NULL,
            receiver TEXT,
            genesis_hash TEXT NOT NULL,
            latest_hash TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS owner_versions (
            owner TEXT PRIMARY KEY,
            version INTEGER NOT NULL
        );
        "#,
    )?;
    Ok(())
}
