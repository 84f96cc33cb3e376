//! Context attached to a dump at dispatch time.

use chrono::Utc;
use crash_protocol_types::Scope;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// Supplies the scope to attach to an upload.
pub trait ContextSource: Send + Sync {
    fn current_scope(&self) -> Scope;
}

/// Merged scope plus caller extras, frozen when the upload starts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextSnapshot {
    pub scope: Scope,
    /// e.g. `crashed_process`, `last_url`.
    pub extra: BTreeMap<String, Value>,
}

impl ContextSnapshot {
    pub fn new(scope: Scope, extra: BTreeMap<String, Value>) -> Self {
        Self { scope, extra }
    }

    /// JSON event record sent next to the dump.
    pub fn to_sidecar(&self) -> Value {
        let mut extra: Map<String, Value> = self
            .scope
            .extra
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (k, v) in &self.extra {
            extra.insert(k.clone(), v.clone());
        }

        let mut sidecar = json!({
            "level": "fatal",
            "platform": "native",
            "timestamp": Utc::now().to_rfc3339(),
            "tags": self.scope.tags,
            "extra": extra,
            "contexts": self.scope.contexts,
            "breadcrumbs": { "values": self.scope.breadcrumbs },
        });

        if let Some(map) = sidecar.as_object_mut() {
            if let Some(user) = &self.scope.user {
                map.insert("user".into(), json!(user));
            }
            if let Some(fingerprint) = &self.scope.fingerprint {
                map.insert("fingerprint".into(), json!(fingerprint));
            }
        }
        sidecar
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crash_protocol_types::{Breadcrumb, User};

    #[test]
    fn test_sidecar_carries_scope_and_extras() {
        let mut scope = Scope::default();
        scope.set_tag("release", "2.0");
        scope.set_extra("locale", json!("en"));
        scope.user = Some(User {
            id: Some("u-9".into()),
            ..Default::default()
        });
        scope.add_breadcrumb(Breadcrumb::new("launched"), 10);

        let extra = BTreeMap::from([
            ("crashed_process".to_string(), json!("renderer")),
            ("locale".to_string(), json!("de")),
        ]);
        let sidecar = ContextSnapshot::new(scope, extra).to_sidecar();

        assert_eq!(sidecar["level"], "fatal");
        assert_eq!(sidecar["tags"]["release"], "2.0");
        assert_eq!(sidecar["user"]["id"], "u-9");
        assert_eq!(sidecar["extra"]["crashed_process"], "renderer");
        // Caller extras win over scope extras.
        assert_eq!(sidecar["extra"]["locale"], "de");
        assert_eq!(sidecar["breadcrumbs"]["values"][0]["message"], "launched");
        assert!(sidecar.get("fingerprint").is_none());
    }

    #[test]
    fn test_empty_snapshot_has_no_user() {
        let sidecar = ContextSnapshot::default().to_sidecar();
        assert!(sidecar.get("user").is_none());
        assert_eq!(sidecar["breadcrumbs"]["values"], json!([]));
    }
}
