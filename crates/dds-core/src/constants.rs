//! Constantes del store de estado de diálogo.
//!
//! Agrupa los nombres de campos reservados y la versión de esquema vigente.
//! Cambiar cualquiera de estos valores rompe la compatibilidad con documentos
//! ya persistidos en `chat_threads.metadata`.

/// Versión semántica actual de la forma del documento. Se estampa en
/// `_schema_version` cuando el candidato no trae una propia.
pub const CURRENT_SCHEMA_VERSION: &str = "1.0.0";

/// Clave (dentro de `metadata` del thread) bajo la cual vive el estado.
pub const STATE_FIELD: &str = "dds_state";

pub const SCHEMA_VERSION_KEY: &str = "_schema_version";
pub const VERSION_KEY: &str = "_version";
pub const TENANT_ID_KEY: &str = "_tenant_id";
pub const UPDATED_AT_KEY: &str = "_updated_at";

/// Claves administradas por el store; el resto del documento es payload opaco.
pub const RESERVED_KEYS: [&str; 4] = [SCHEMA_VERSION_KEY, VERSION_KEY, TENANT_ID_KEY, UPDATED_AT_KEY];

/// Mayor versión representable: la columna se compara como `bigint`.
pub const MAX_VERSION: u64 = i64::MAX as u64;
