//! Roles, position classification and per-role feature modules.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use crate::record::{field_text, FieldValue, Record};
use crate::store::codec::DOC_ID_FIELD;

/// The closed set of application roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Billing,
    Collection,
    Service,
    Hr,
    Technician,
    Messenger,
    Viewer,
}

impl Role {
    pub const ALL: [Role; 8] = [
        Role::Admin,
        Role::Billing,
        Role::Collection,
        Role::Service,
        Role::Hr,
        Role::Technician,
        Role::Messenger,
        Role::Viewer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Billing => "billing",
            Role::Collection => "collection",
            Role::Service => "service",
            Role::Hr => "hr",
            Role::Technician => "technician",
            Role::Messenger => "messenger",
            Role::Viewer => "viewer",
        }
    }

    /// Parse a stored role name (case and surrounding whitespace ignored).
    pub fn from_name(name: &str) -> Option<Role> {
        let name = name.trim().to_lowercase();
        Role::ALL.into_iter().find(|role| role.as_str() == name)
    }

    fn default_modules(&self) -> &'static [&'static str] {
        match self {
            Role::Admin => &[
                "customers", "billing", "collections", "service", "inventory", "hr", "reports",
                "settings", "sync", "field", "purchasing", "pettycash", "sales",
            ],
            Role::Billing => &["customers", "billing", "reports"],
            Role::Collection => &["customers", "collections", "reports"],
            Role::Service => &["customers", "service", "inventory", "field"],
            Role::Hr => &["hr", "settings"],
            Role::Technician => &["field"],
            Role::Messenger => &["field"],
            Role::Viewer => &["customers", "reports"],
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyword groups scanned top to bottom; the first group with a keyword
/// contained in the position wins.
const POSITION_RULES: &[(&[&str], Role)] = &[
    (&["admin", "manager"], Role::Admin),
    (&["collect"], Role::Collection),
    (&["billing", "cashier", "account", "finance", "purchasing"], Role::Billing),
    (&["messenger", "driver"], Role::Messenger),
    (&["tech", "maintenance", "refiller"], Role::Technician),
    (&["service", "csr", "sales"], Role::Service),
    (&["hr"], Role::Hr),
];

/// Map a free-text job position to a role.
///
/// ```
/// use dumpsync::reconcile::{classify_position, Role};
///
/// assert_eq!(classify_position("Branch Manager"), Role::Admin);
/// assert_eq!(classify_position("Collection Staff / Cashier"), Role::Collection);
/// assert_eq!(classify_position(""), Role::Viewer);
/// ```
pub fn classify_position(position: &str) -> Role {
    let position = position.trim().to_lowercase();
    POSITION_RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| position.contains(k)))
        .map(|(_, role)| *role)
        .unwrap_or(Role::Viewer)
}

/// Feature modules each role may access.
///
/// Built from defaults plus optional per-role overrides; read-only once
/// constructed.
#[derive(Debug, Clone)]
pub struct RoleModuleTable {
    modules: HashMap<Role, Vec<String>>,
}

impl RoleModuleTable {
    pub fn defaults() -> Self {
        let modules = Role::ALL
            .into_iter()
            .map(|role| {
                let defaults = role.default_modules().iter().map(|m| m.to_string()).collect();
                (role, defaults)
            })
            .collect();
        Self { modules }
    }

    /// Apply overrides from role-permission documents.
    ///
    /// The role comes from the document's `role` field, falling back to its
    /// document id. Documents naming an unknown role are ignored. A document
    /// without `allowed_modules` leaves its role with no modules.
    pub fn with_overrides(mut self, docs: &[Record]) -> Self {
        for doc in docs {
            let mut name = field_text(doc, "role");
            if name.trim().is_empty() {
                name = field_text(doc, DOC_ID_FIELD);
            }
            let Some(role) = Role::from_name(&name) else {
                debug!(role = %name, "ignoring permissions for unknown role");
                continue;
            };
            let modules = doc
                .get("allowed_modules")
                .map(normalize_modules)
                .unwrap_or_default();
            debug!(role = %role, modules = modules.len(), "role modules overridden");
            self.modules.insert(role, modules);
        }
        self
    }

    pub fn modules(&self, role: Role) -> &[String] {
        self.modules.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl Default for RoleModuleTable {
    fn default() -> Self {
        Self::defaults()
    }
}

/// Normalize a module list given as a list or a comma-separated string:
/// trimmed, lower-cased, empties dropped, first occurrence kept.
pub fn normalize_modules(value: &FieldValue) -> Vec<String> {
    let raw: Vec<String> = match value {
        FieldValue::List(items) => items.iter().map(FieldValue::to_text).collect(),
        FieldValue::String(s) => s.split(',').map(str::to_string).collect(),
        _ => return Vec::new(),
    };

    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for item in raw {
        let module = item.trim().to_lowercase();
        if !module.is_empty() && !out.contains(&module) {
            out.push(module);
        }
    }
    out
}
