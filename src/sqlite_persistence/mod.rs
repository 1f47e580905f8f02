mod versioned_schema;

pub use versioned_schema::{
    migrate_to_latest, Column, SchemaVersion, SqlType, Table, BASE_DB_VERSION, DEFAULT_TIMESTAMP,
};
