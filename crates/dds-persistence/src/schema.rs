//! Esquema Diesel (mantenido a mano). Reemplazable con `diesel print-schema`.
//!
//! `chat_threads` es propiedad de la capa conversacional; este crate sólo lee
//! y escribe la sub-clave `metadata.dds_state`.

diesel::table! {
    chat_threads (id) {
        id -> Text,
        tenant_id -> Nullable<Text>,
        metadata -> Nullable<Jsonb>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}
