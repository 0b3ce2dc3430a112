//! Lectura de `metadata.dds_state` compartida por los caminos directo y
//! gestionado.

use dds_core::constants::STATE_FIELD;
use dds_core::DialogueState;
use serde_json::{Map, Value};

use crate::error::PersistenceError;

/// `None` si la fila no tiene `metadata` o le falta la sub-clave de estado.
pub(crate) fn state_from_metadata(metadata: Option<&Map<String, Value>>)
                                  -> Result<Option<DialogueState>, PersistenceError> {
    match metadata.and_then(|m| m.get(STATE_FIELD)) {
        None | Some(Value::Null) => Ok(None),
        Some(doc) => DialogueState::from_document(doc.clone()).map(Some)
                                                              .map_err(|e| PersistenceError::Decode(e.to_string())),
    }
}

/// Igual que `state_from_metadata`, pero desde la columna JSONB cruda.
pub(crate) fn state_from_column(column: Option<Value>) -> Result<Option<DialogueState>, PersistenceError> {
    match column {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => state_from_metadata(Some(&map)),
        Some(other) => Err(PersistenceError::Decode(format!("metadata is not an object: {other}"))),
    }
}

/// Un estado firmado por otro tenant no pertenece a la sesión actual.
pub(crate) fn owned_by_other_tenant(state: &DialogueState, session_tenant: Option<&str>) -> bool {
    match (state.tenant_id.as_deref(), session_tenant) {
        (Some(stored), Some(session)) => stored != session,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn missing_or_null_state_field_is_no_state() {
        assert_eq!(state_from_metadata(None).unwrap(), None);
        assert_eq!(state_from_metadata(Some(&map(json!({"visitor_id": "v"})))).unwrap(), None);
        assert_eq!(state_from_column(Some(json!({"dds_state": null}))).unwrap(), None);
    }

    #[test]
    fn non_object_column_is_a_decode_error() {
        assert!(matches!(state_from_column(Some(json!([1]))), Err(PersistenceError::Decode(_))));
    }

    #[test]
    fn foreign_tenant_is_detected_only_when_both_sides_are_known() {
        let state = state_from_column(Some(json!({"dds_state": {"_version": 2, "_tenant_id": "t1"}}))).unwrap()
                                                                                                        .unwrap();
        assert!(owned_by_other_tenant(&state, Some("t2")));
        assert!(!owned_by_other_tenant(&state, Some("t1")));
        assert!(!owned_by_other_tenant(&state, None));
        assert!(!owned_by_other_tenant(&DialogueState::default(), Some("t2")));
    }
}
