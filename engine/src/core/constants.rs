// =============================================================================
// Application Identity
// =============================================================================

/// Binary name
pub const APP_NAME: &str = "sq";

/// Config file looked up in the working directory when none is given
pub const CONFIG_FILE_NAME: &str = "sq.json";

// =============================================================================
// Environment Variables
// =============================================================================

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "SQ_CONFIG";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "SQ_LOG";

/// Environment variable for the default page size
pub const ENV_PAGE_SIZE: &str = "SQ_PAGE_SIZE";

/// Environment variable for the in-memory batch size
pub const ENV_BATCH_SIZE: &str = "SQ_BATCH_SIZE";

/// Environment variable for the in-memory worker limit
pub const ENV_MAX_WORKERS: &str = "SQ_MAX_WORKERS";

/// Environment variable for the SQL dialect (sqlite or postgres)
pub const ENV_DIALECT: &str = "SQ_DIALECT";

/// Environment variable for the SQL unknown-field policy (skip or reject)
pub const ENV_SQL_UNKNOWN_FIELDS: &str = "SQ_SQL_UNKNOWN_FIELDS";

/// Environment variable for the in-memory unknown-field policy (skip or reject)
pub const ENV_MEMORY_UNKNOWN_FIELDS: &str = "SQ_MEMORY_UNKNOWN_FIELDS";

// =============================================================================
// Pagination
// =============================================================================

/// Page size used when the request asks for zero or a negative size
pub const DEFAULT_PAGE_SIZE: u64 = 30;

// =============================================================================
// Request Decoding
// =============================================================================

/// Maximum size of an encoded filter or sort parameter (64KB)
pub const MAX_FILTER_PARAM_SIZE: usize = 64 * 1024;

/// Maximum number of filter terms or sort fields per request
pub const MAX_FILTER_TERMS: usize = 50;

// =============================================================================
// In-Memory Evaluator
// =============================================================================

/// Items per batch handed to a worker
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Initial capacity of pooled scratch buffers
pub const SCRATCH_BUFFER_CAPACITY: usize = 1024;

/// Maximum number of idle scratch buffers kept between calls
pub const SCRATCH_POOL_LIMIT: usize = 64;

// =============================================================================
// Relational Schema Defaults
// =============================================================================

/// Default primary key column
pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// Default last-modified column (default sort, descending)
pub const DEFAULT_UPDATED_AT_COLUMN: &str = "updated_at";

/// Default soft-delete column
pub const DEFAULT_DELETED_AT_COLUMN: &str = "deleted_at";

/// Separator between relation names in nested join aliases
pub const JOIN_ALIAS_SEPARATOR: &str = "__";
