//! Scope: user, tags, extras, contexts and breadcrumbs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Breadcrumb severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Fatal,
}

/// A timestamped trail entry recorded before an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub level: Level,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, Value>,
}

impl Breadcrumb {
    /// A breadcrumb stamped now.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind: None,
            category: None,
            message: Some(message.into()),
            level: Level::Info,
            data: BTreeMap::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }
}

/// The user affected by a crash.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    /// Any other keys the application attached.
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

/// Mutable context attached to events and crash uploads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub extra: BTreeMap<String, Value>,
    #[serde(default)]
    pub contexts: BTreeMap<String, BTreeMap<String, Value>>,
    /// Oldest first.
    #[serde(default)]
    pub breadcrumbs: Vec<Breadcrumb>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Vec<String>>,
}

impl Scope {
    /// Merge `incoming` into this scope.
    ///
    /// Map-valued fields merge key-by-key with `incoming` winning, `user`
    /// and `fingerprint` are replaced when present, and breadcrumbs are
    /// appended then trimmed to the newest `max_breadcrumbs`.
    pub fn merge(&mut self, incoming: Scope, max_breadcrumbs: usize) {
        let Scope {
            user,
            tags,
            extra,
            contexts,
            breadcrumbs,
            fingerprint,
        } = incoming;

        if user.is_some() {
            self.user = user;
        }
        if fingerprint.is_some() {
            self.fingerprint = fingerprint;
        }
        self.tags.extend(tags);
        self.extra.extend(extra);
        self.contexts.extend(contexts);

        self.breadcrumbs.extend(breadcrumbs);
        self.trim_breadcrumbs(max_breadcrumbs);
    }

    /// Ring-buffer append: the oldest breadcrumb is evicted past `max`.
    pub fn add_breadcrumb(&mut self, crumb: Breadcrumb, max_breadcrumbs: usize) {
        self.breadcrumbs.push(crumb);
        self.trim_breadcrumbs(max_breadcrumbs);
    }

    pub fn set_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    pub fn set_extra(&mut self, key: impl Into<String>, value: Value) {
        self.extra.insert(key.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self == &Scope::default()
    }

    fn trim_breadcrumbs(&mut self, max_breadcrumbs: usize) {
        if self.breadcrumbs.len() > max_breadcrumbs {
            let excess = self.breadcrumbs.len() - max_breadcrumbs;
            self.breadcrumbs.drain(..excess);
        }
    }
}
