use redb::TableDefinition;

/// File records: hex id -> FileRecord (msgpack)
pub const FILES: TableDefinition<&str, &[u8]> = TableDefinition::new("files");

/// Filename index: filename -> msgpack Vec of hex ids (active and soft-deleted)
pub const FILE_NAMES: TableDefinition<&str, &[u8]> = TableDefinition::new("file_names");

/// Owner index: owner hex id -> msgpack Vec of hex ids
pub const OWNER_FILES: TableDefinition<&str, &[u8]> = TableDefinition::new("owner_files");
